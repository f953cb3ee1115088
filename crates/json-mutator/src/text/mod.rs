//! Text merge for concurrent string edits.
//!
//! ```
//! use json_mutator::text::{apply_text_patch, make_patch, stringify_patch, TextPatchOptions};
//!
//! let hunks = make_patch("the quick brown fox", "the quick brown cat", &TextPatchOptions::default());
//! let patch = stringify_patch(&hunks);
//!
//! // The other side has edited the start of the sentence meanwhile.
//! let merged = apply_text_patch("a quick brown fox", &patch).unwrap();
//! assert_eq!(merged, "a quick brown cat");
//! ```

mod bitap;
pub mod diff;
mod patch;

pub use bitap::{match_main, MatchOptions, MATCH_MAX_BITS};
pub use diff::{Diff, DiffOp};
pub use patch::{
    apply_hunks, apply_text_patch, make_patch, merge_hunks, parse_patch, stringify_patch,
    Hunk, TextPatchError, TextPatchOptions,
};

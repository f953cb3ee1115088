//! Path expressions for structured JSON documents.
//!
//! A path addresses locations in a document by property name, array index,
//! or array element identity (`_key`). Ranges, wildcards and unions make a
//! path ambiguous; the matcher expands those into concrete paths.
//!
//! # Example
//!
//! ```
//! use json_mutator_path::{json_match, Path};
//! use serde_json::json;
//!
//! let doc = json!({
//!     "body": [
//!         {"_key": "p1", "text": "hello"},
//!         {"_key": "p2", "text": "world"}
//!     ]
//! });
//!
//! let path = Path::parse("body[*].text").unwrap();
//! let found = json_match(&doc, &path);
//! assert_eq!(found.len(), 2);
//! assert_eq!(found[1].path.to_string(), "body[1].text");
//! ```

mod types;
pub use types::{Path, PathSegment};

mod parser;
pub use parser::{ParseError, PathParser};

mod matcher;
pub use matcher::{json_match, match_targets, Match, Target};

pub mod util;

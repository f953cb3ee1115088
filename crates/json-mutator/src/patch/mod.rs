//! Document patches.
//!
//! # Operations
//!
//! Value operations: `set`, `setIfMissing`, `unset`, `inc`, `dec`,
//! `diffMatchPatch`.
//!
//! Array operations: `insert` (`before`/`after`), `replace`, `upsert`,
//! `truncate`, `move`.
//!
//! ```
//! use json_mutator::patch::{from_json_patches, Applier};
//! use serde_json::json;
//!
//! let patches = from_json_patches(&json!([
//!     {"type": "set", "path": "name.first", "value": "c"},
//!     {"type": "insert", "before": "tags[-1]", "items": ["new"]},
//! ])).unwrap();
//!
//! let doc = json!({"name": {"first": "a", "last": "b"}, "tags": ["x"]});
//! let out = Applier::default().apply_all(&doc, &patches).unwrap();
//! assert_eq!(out, json!({"name": {"first": "c", "last": "b"}, "tags": ["x", "new"]}));
//! ```

pub mod types;
pub mod apply;
pub mod codec;

pub use types::{Patch, ValueKind};
pub use apply::Applier;
pub use codec::{from_json, from_json_patches, to_json, to_json_patches};

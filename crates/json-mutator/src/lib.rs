//! json-mutator: patches, transactions and optimistic reconciliation for
//! structured JSON documents.
//!
//! Documents are plain [`serde_json::Value`] trees. Locations are path
//! expressions (see [`json_mutator_path`]) that can address array items by
//! their stable `_key` as well as by index.
//!
//! ```
//! use json_mutator::{Applier, Patch, Path};
//! use serde_json::json;
//!
//! let doc = json!({"body": [{"_key": "p1", "text": "hello"}]});
//! let patch = Patch::set(Path::parse(r#"body[_key=="p1"].text"#).unwrap(), json!("hi"));
//! let out = Applier::default().apply(&doc, &patch).unwrap();
//! assert_eq!(out["body"][0]["text"], json!("hi"));
//! ```

pub mod config;
pub mod deep;
pub mod error;
pub mod insert;
pub mod keys;

pub mod text;
pub mod patch;
pub mod mutation;
pub mod sync;

pub mod cli;

pub use json_mutator_path::{Path, PathSegment};

pub use config::{ConfigError, KeyConfig, SessionConfig};
pub use deep::{get_deep, set_deep, unset_deep};
pub use error::{PatchError, SessionError, SubmitError};
pub use insert::InsertPosition;
pub use keys::{ensure_array_keys_deep, KeyGenerator, RandomKeys};
pub use mutation::{Mutation, Transaction};
pub use patch::{Applier, Patch};
pub use sync::{MemoryAuthority, SessionHandle, SyncDocument, SyncEvent, SyncState};

//! Logic behind the `json-mutate` binary.
//!
//! - `json-mutate '<patches>'` applies a JSON array of patches to the
//!   document read from stdin.
//! - `json-mutate '<transaction>'` applies a transaction to the document (or
//!   array of documents) read from stdin.
//! - `json-mutate --diff '<old>' '<new>'` prints the text patch turning one
//!   string into the other.

use serde_json::Value;
use thiserror::Error;

use crate::error::PatchError;
use crate::mutation::{apply_transaction, document_id, transaction_from_json, Documents};
use crate::patch::{from_json_patches, Applier};
use crate::text::{make_patch, stringify_patch, TextPatchOptions};

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Patch(#[from] PatchError),
    #[error("usage: {0}")]
    Usage(String),
}

// ── Commands ──────────────────────────────────────────────────────────────

/// Applies patches (`[{"type": ..}]`) or a transaction (`{"mutations": ..}`
/// or an array of mutations) to `input`. Returns pretty-printed JSON.
pub fn mutate(input: &str, operations: &str) -> Result<String, CliError> {
    let doc: Value = serde_json::from_str(input)?;
    let ops: Value = serde_json::from_str(operations)?;

    let is_patch_list = ops
        .as_array()
        .is_some_and(|items| items.iter().all(|op| op.get("type").is_some()));
    let out = if is_patch_list {
        let patches = from_json_patches(&ops)?;
        Applier::default().apply_all(&doc, &patches)?
    } else {
        apply_to_documents(doc, &ops)?
    };
    Ok(serde_json::to_string_pretty(&out)?)
}

fn apply_to_documents(input: Value, tx: &Value) -> Result<Value, CliError> {
    let tx = transaction_from_json(tx)?;
    let single = !input.is_array();
    let docs = match input {
        Value::Array(docs) => docs,
        Value::Null => Vec::new(),
        doc => vec![doc],
    };
    let mut documents = Documents::new();
    for doc in docs {
        let id = document_id(&doc).ok_or(PatchError::MissingId)?.to_string();
        documents.insert(id, doc);
    }

    let out = apply_transaction(&mut Applier::default(), &documents, &tx)?;
    let mut docs: Vec<Value> = out.into_values().collect();
    if single && docs.len() <= 1 {
        return Ok(docs.pop().unwrap_or(Value::Null));
    }
    Ok(Value::Array(docs))
}

/// The text patch turning `old` into `new`.
pub fn diff(old: &str, new: &str) -> String {
    stringify_patch(&make_patch(old, new, &TextPatchOptions::default()))
}

//! Error taxonomy for patch application, mutations, and sessions.

use json_mutator_path::{ParseError, Path};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while applying patches or mutations.
///
/// Missing-path no-ops (unset of an absent path, insert without a matching
/// reference) are not errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    #[error("path `{path}` is ambiguous and cannot address a single value")]
    AmbiguousPath { path: Path },
    #[error("cannot {op} at path `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        path: Path,
        expected: &'static str,
        found: Value,
    },
    #[error("revision mismatch for document `{id}`: expected `{expected}`, found `{}`", .actual.as_deref().unwrap_or("none"))]
    RevisionMismatch {
        id: String,
        expected: String,
        actual: Option<String>,
    },
    #[error("failed to apply text patch at path `{path}`: {patch}")]
    PatchApplication { path: Path, patch: String },
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] ParseError),
    #[error("document `{0}` already exists")]
    DocumentExists(String),
    #[error("document `{0}` not found")]
    DocumentNotFound(String),
    #[error("document is missing `_id`")]
    MissingId,
    #[error("transaction contains no mutations")]
    EmptyTransaction,
}

impl PatchError {
    pub(crate) fn type_mismatch(
        op: &'static str,
        path: &Path,
        expected: &'static str,
        found: &Value,
    ) -> Self {
        PatchError::TypeMismatch {
            op,
            path: path.clone(),
            expected,
            found: found.clone(),
        }
    }
}

/// Reasons a remote authority may refuse a transaction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitError {
    /// The authority evaluated the transaction and refused it.
    #[error("transaction rejected: {0}")]
    Rejected(#[source] PatchError),
    /// The authority could not be reached. Safe to retry.
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Unavailable(_))
    }
}

/// Errors surfaced by a running session handle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error(transparent)]
    Patch(#[from] PatchError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_name_the_path_and_value() {
        let err = PatchError::type_mismatch(
            "diffMatchPatch",
            &Path::parse("title").unwrap(),
            "string",
            &json!(3),
        );
        assert_eq!(
            err.to_string(),
            "cannot diffMatchPatch at path `title`: expected string, found 3"
        );
    }

    #[test]
    fn revision_mismatch_without_revision() {
        let err = PatchError::RevisionMismatch {
            id: "doc".into(),
            expected: "r1".into(),
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "revision mismatch for document `doc`: expected `r1`, found `none`"
        );
    }

    #[test]
    fn only_transport_failures_retry() {
        assert!(SubmitError::Unavailable("timeout".into()).is_retryable());
        assert!(!SubmitError::Rejected(PatchError::MissingId).is_retryable());
    }
}

//! Document-level mutations and transactions.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::patch::Patch;

/// Documents by `_id`.
pub type Documents = BTreeMap<String, Value>;

/// Reads the `_id` of a document.
pub fn document_id(doc: &Value) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

/// Reads the `_rev` of a document.
pub fn document_rev(doc: &Value) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Fails if a document with the same `_id` exists.
    Create(Value),
    CreateIfNotExists(Value),
    CreateOrReplace(Value),
    /// Deleting a missing document is a no-op.
    Delete {
        id: String,
    },
    Patch {
        id: String,
        patches: Vec<Patch>,
        /// Only apply when the document is at exactly this revision.
        if_revision: Option<String>,
    },
}

impl Mutation {
    pub fn patch(id: impl Into<String>, patches: Vec<Patch>) -> Self {
        Mutation::Patch {
            id: id.into(),
            patches,
            if_revision: None,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Mutation::Delete { id: id.into() }
    }

    /// Id of the document the mutation targets. `None` for a create whose
    /// document has no `_id`.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Mutation::Create(doc) | Mutation::CreateIfNotExists(doc) | Mutation::CreateOrReplace(doc) => {
                document_id(doc)
            }
            Mutation::Delete { id } | Mutation::Patch { id, .. } => Some(id),
        }
    }

    /// Wire name of the mutation.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "create",
            Mutation::CreateIfNotExists(_) => "createIfNotExists",
            Mutation::CreateOrReplace(_) => "createOrReplace",
            Mutation::Delete { .. } => "delete",
            Mutation::Patch { .. } => "patch",
        }
    }
}

/// An ordered, non-empty list of mutations applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Becomes the `_rev` of every document the transaction touches.
    pub id: Option<String>,
    pub mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new(mutations: Vec<Mutation>) -> Self {
        Self {
            id: None,
            mutations,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Distinct ids of the documents touched, in first-mention order.
    pub fn document_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.mutations.iter().filter_map(Mutation::document_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Whether any mutation targets document `id`.
    pub fn touches(&self, id: &str) -> bool {
        self.mutations.iter().any(|m| m.document_id() == Some(id))
    }

    /// The mutations that target document `id`, in order.
    pub fn for_document(&self, id: &str) -> Vec<Mutation> {
        self.mutations
            .iter()
            .filter(|m| m.document_id() == Some(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_ids_are_distinct_and_ordered() {
        let tx = Transaction::new(vec![
            Mutation::delete("b"),
            Mutation::Create(json!({"_id": "a"})),
            Mutation::patch("b", vec![]),
            Mutation::Create(json!({"title": "no id"})),
        ]);
        assert_eq!(tx.document_ids(), vec!["b", "a"]);
        assert!(tx.touches("a"));
        assert!(!tx.touches("c"));
        assert_eq!(tx.for_document("b").len(), 2);
    }
}

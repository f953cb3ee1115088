//! Mutation and transaction application.

use serde_json::Value;

use super::types::{document_id, document_rev, Documents, Mutation, Transaction};
use crate::error::PatchError;
use crate::keys::KeyGenerator;
use crate::patch::Applier;

/// Applies one mutation to the document it targets (`None` when that
/// document does not exist). Returns the document afterwards, `None` when it
/// was deleted or never existed.
pub fn apply_mutation<K: KeyGenerator>(
    applier: &mut Applier<K>,
    current: Option<&Value>,
    mutation: &Mutation,
) -> Result<Option<Value>, PatchError> {
    match mutation {
        Mutation::Create(doc) => {
            let id = document_id(doc).ok_or(PatchError::MissingId)?;
            if current.is_some() {
                return Err(PatchError::DocumentExists(id.to_string()));
            }
            Ok(Some(keyed(applier, doc)))
        }
        Mutation::CreateIfNotExists(doc) => {
            document_id(doc).ok_or(PatchError::MissingId)?;
            match current {
                Some(existing) => Ok(Some(existing.clone())),
                None => Ok(Some(keyed(applier, doc))),
            }
        }
        Mutation::CreateOrReplace(doc) => {
            document_id(doc).ok_or(PatchError::MissingId)?;
            Ok(Some(keyed(applier, doc)))
        }
        Mutation::Delete { .. } => Ok(None),
        Mutation::Patch {
            id,
            patches,
            if_revision,
        } => {
            let doc = current.ok_or_else(|| PatchError::DocumentNotFound(id.clone()))?;
            if let Some(expected) = if_revision {
                let actual = document_rev(doc);
                if actual != Some(expected.as_str()) {
                    return Err(PatchError::RevisionMismatch {
                        id: id.clone(),
                        expected: expected.clone(),
                        actual: actual.map(str::to_string),
                    });
                }
            }
            applier.apply_all(doc, patches).map(Some)
        }
    }
}

/// Keys every new array item `tx` carries, so each replica applying it
/// ends up with the same keys.
pub fn normalize_transaction_keys<K: KeyGenerator>(applier: &mut Applier<K>, tx: &mut Transaction) {
    for mutation in &mut tx.mutations {
        match mutation {
            Mutation::Create(doc) | Mutation::CreateIfNotExists(doc) | Mutation::CreateOrReplace(doc) => {
                applier.normalize_keys(doc)
            }
            Mutation::Patch { patches, .. } => {
                for patch in patches {
                    applier.normalize_patch_keys(patch);
                }
            }
            Mutation::Delete { .. } => {}
        }
    }
}

fn keyed<K: KeyGenerator>(applier: &mut Applier<K>, doc: &Value) -> Value {
    let mut doc = doc.clone();
    applier.normalize_keys(&mut doc);
    doc
}

/// Applies a transaction to a set of documents.
///
/// Mutations run in order against a working copy; `documents` is only read,
/// so a failing mutation leaves no trace. `_rev` is only restamped once all
/// mutations succeeded, so revision preconditions see the revision a document
/// had when the transaction started. Every document the transaction touches
/// and that still exists afterwards gets `_rev` set to the transaction id.
pub fn apply_transaction<K: KeyGenerator>(
    applier: &mut Applier<K>,
    documents: &Documents,
    tx: &Transaction,
) -> Result<Documents, PatchError> {
    if tx.mutations.is_empty() {
        return Err(PatchError::EmptyTransaction);
    }
    let mut working = documents.clone();
    for mutation in &tx.mutations {
        let id = mutation
            .document_id()
            .ok_or(PatchError::MissingId)?
            .to_string();
        let next = apply_mutation(applier, working.get(&id), mutation)?;
        match next {
            Some(doc) => {
                working.insert(id, doc);
            }
            None => {
                working.remove(&id);
            }
        }
    }
    if let Some(rev) = &tx.id {
        for id in tx.document_ids() {
            if let Some(doc) = working.get_mut(id) {
                set_rev(doc, rev);
            }
        }
    }
    Ok(working)
}

/// Applies the mutations of `tx` that target document `id`.
pub fn apply_to_document<K: KeyGenerator>(
    applier: &mut Applier<K>,
    id: &str,
    doc: Option<&Value>,
    tx: &Transaction,
) -> Result<Option<Value>, PatchError> {
    let mut documents = Documents::new();
    if let Some(doc) = doc {
        documents.insert(id.to_string(), doc.clone());
    }
    let scoped = Transaction {
        id: tx.id.clone(),
        mutations: tx.for_document(id),
    };
    if scoped.mutations.is_empty() {
        return Ok(doc.cloned());
    }
    let mut out = apply_transaction(applier, &documents, &scoped)?;
    Ok(out.remove(id))
}

fn set_rev(doc: &mut Value, rev: &str) {
    if let Value::Object(map) = doc {
        map.insert("_rev".to_string(), Value::String(rev.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Patch;
    use json_mutator_path::Path;
    use serde_json::json;

    fn applier() -> Applier<impl FnMut() -> String> {
        let mut n = 0;
        Applier::new(move || {
            n += 1;
            format!("k{n}")
        })
    }

    fn docs(values: &[Value]) -> Documents {
        values
            .iter()
            .map(|v| (document_id(v).unwrap().to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_rejects_existing_documents() {
        let store = docs(&[json!({"_id": "a"})]);
        let tx = Transaction::new(vec![Mutation::Create(json!({"_id": "a"}))]);
        assert_eq!(
            apply_transaction(&mut applier(), &store, &tx),
            Err(PatchError::DocumentExists("a".into()))
        );
    }

    #[test]
    fn create_if_not_exists_keeps_the_existing_document() {
        let store = docs(&[json!({"_id": "a", "v": 1})]);
        let tx = Transaction::new(vec![Mutation::CreateIfNotExists(json!({"_id": "a", "v": 2}))]);
        let out = apply_transaction(&mut applier(), &store, &tx).unwrap();
        assert_eq!(out["a"], json!({"_id": "a", "v": 1}));
    }

    #[test]
    fn created_documents_get_item_keys() {
        let tx = Transaction::new(vec![Mutation::CreateOrReplace(
            json!({"_id": "a", "items": [{"v": 1}]}),
        )]);
        let out = apply_transaction(&mut applier(), &Documents::new(), &tx).unwrap();
        assert_eq!(out["a"]["items"][0]["_key"], json!("k1"));
    }

    #[test]
    fn transactions_are_atomic() {
        let store = docs(&[json!({"_id": "a", "v": 1})]);
        let tx = Transaction::new(vec![
            Mutation::patch("a", vec![Patch::set(Path::parse("v").unwrap(), json!(2))]),
            Mutation::patch("missing", vec![]),
        ]);
        assert_eq!(
            apply_transaction(&mut applier(), &store, &tx),
            Err(PatchError::DocumentNotFound("missing".into()))
        );
        assert_eq!(store["a"]["v"], json!(1));
    }

    #[test]
    fn revision_guard_and_stamp() {
        let store = docs(&[json!({"_id": "a", "_rev": "r1", "v": 1})]);
        let guarded = |rev: &str| Mutation::Patch {
            id: "a".into(),
            patches: vec![Patch::inc(Path::parse("v").unwrap(), 1)],
            if_revision: Some(rev.into()),
        };

        let tx = Transaction::new(vec![guarded("r1"), guarded("r1")]).with_id("r2");
        let out = apply_transaction(&mut applier(), &store, &tx).unwrap();
        assert_eq!(out["a"], json!({"_id": "a", "_rev": "r2", "v": 3}));

        let tx = Transaction::new(vec![guarded("r0")]).with_id("r3");
        assert_eq!(
            apply_transaction(&mut applier(), &store, &tx),
            Err(PatchError::RevisionMismatch {
                id: "a".into(),
                expected: "r0".into(),
                actual: Some("r1".into()),
            })
        );
    }

    #[test]
    fn delete_missing_is_noop_and_empty_is_rejected() {
        let tx = Transaction::new(vec![Mutation::delete("nope")]);
        assert_eq!(apply_transaction(&mut applier(), &Documents::new(), &tx), Ok(Documents::new()));
        assert_eq!(
            apply_transaction(&mut applier(), &Documents::new(), &Transaction::new(vec![])),
            Err(PatchError::EmptyTransaction)
        );
    }

    #[test]
    fn scoped_to_one_document() {
        let tx = Transaction::new(vec![
            Mutation::CreateOrReplace(json!({"_id": "a", "v": 1})),
            Mutation::CreateOrReplace(json!({"_id": "b", "v": 2})),
        ])
        .with_id("r1");
        let out = apply_to_document(&mut applier(), "b", None, &tx).unwrap();
        assert_eq!(out, Some(json!({"_id": "b", "v": 2, "_rev": "r1"})));
        let untouched = apply_to_document(&mut applier(), "c", None, &tx).unwrap();
        assert_eq!(untouched, None);
    }
}

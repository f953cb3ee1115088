//! JSON codec for mutations and transactions.
//!
//! ```text
//! {"create": {...}} | {"createIfNotExists": {...}} | {"createOrReplace": {...}}
//! {"delete": {"id": "..."}}
//! {"patch": {"id": "...", "patches": [...], "options": {"ifRevision": "..."}}}
//! {"type": "transaction", "id": "...", "mutations": [...]}
//! ```

use serde_json::{json, Map, Value};

use super::types::{Mutation, Transaction};
use crate::error::PatchError;
use crate::patch;

fn invalid(msg: impl Into<String>) -> PatchError {
    PatchError::InvalidPatch(msg.into())
}

fn decode_id(body: &Value, kind: &str) -> Result<String, PatchError> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("{kind} mutation is missing `id`")))
}

fn decode_document(body: &Value, kind: &str) -> Result<Value, PatchError> {
    if body.is_object() {
        Ok(body.clone())
    } else {
        Err(invalid(format!("{kind} mutation needs a document object")))
    }
}

// ── Deserialization ───────────────────────────────────────────────────────

pub fn mutation_from_json(v: &Value) -> Result<Mutation, PatchError> {
    let obj = v
        .as_object()
        .ok_or_else(|| invalid("mutation must be an object"))?;
    let (kind, body) = match (obj.len(), obj.iter().next()) {
        (1, Some(entry)) => entry,
        _ => return Err(invalid("mutation must have exactly one field")),
    };

    match kind.as_str() {
        "create" => Ok(Mutation::Create(decode_document(body, kind)?)),
        "createIfNotExists" => Ok(Mutation::CreateIfNotExists(decode_document(body, kind)?)),
        "createOrReplace" => Ok(Mutation::CreateOrReplace(decode_document(body, kind)?)),
        "delete" => Ok(Mutation::Delete {
            id: decode_id(body, kind)?,
        }),
        "patch" => {
            let patches = match body.get("patches") {
                Some(list) => patch::from_json_patches(list)?,
                None => Vec::new(),
            };
            let if_revision = match body.get("options").and_then(|o| o.get("ifRevision")) {
                None | Some(Value::Null) => None,
                Some(Value::String(rev)) => Some(rev.clone()),
                Some(_) => return Err(invalid("ifRevision must be a string")),
            };
            Ok(Mutation::Patch {
                id: decode_id(body, kind)?,
                patches,
                if_revision,
            })
        }
        other => Err(invalid(format!("unknown mutation: {other}"))),
    }
}

/// Decodes a transaction. A bare array of mutations is accepted too.
pub fn transaction_from_json(v: &Value) -> Result<Transaction, PatchError> {
    let (id, mutations) = match v {
        Value::Array(_) => (None, v),
        Value::Object(obj) => {
            if let Some(t) = obj.get("type") {
                if t != "transaction" {
                    return Err(invalid(format!("expected a transaction, found type {t}")));
                }
            }
            let id = match obj.get("id") {
                None | Some(Value::Null) => None,
                Some(Value::String(id)) => Some(id.clone()),
                Some(_) => return Err(invalid("transaction id must be a string")),
            };
            let mutations = obj
                .get("mutations")
                .ok_or_else(|| invalid("transaction is missing `mutations`"))?;
            (id, mutations)
        }
        _ => return Err(invalid("transaction must be an object")),
    };
    let mutations = mutations
        .as_array()
        .ok_or_else(|| invalid("mutations must be an array"))?
        .iter()
        .map(mutation_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Transaction { id, mutations })
}

// ── Serialization ─────────────────────────────────────────────────────────

pub fn mutation_to_json(mutation: &Mutation) -> Value {
    let body = match mutation {
        Mutation::Create(doc) | Mutation::CreateIfNotExists(doc) | Mutation::CreateOrReplace(doc) => {
            doc.clone()
        }
        Mutation::Delete { id } => json!({ "id": id }),
        Mutation::Patch {
            id,
            patches,
            if_revision,
        } => {
            let mut m = Map::new();
            m.insert("id".into(), json!(id));
            m.insert("patches".into(), patch::to_json_patches(patches));
            if let Some(rev) = if_revision {
                m.insert("options".into(), json!({ "ifRevision": rev }));
            }
            Value::Object(m)
        }
    };
    let mut m = Map::new();
    m.insert(mutation.kind().into(), body);
    Value::Object(m)
}

pub fn transaction_to_json(tx: &Transaction) -> Value {
    let mut m = Map::new();
    m.insert("type".into(), json!("transaction"));
    if let Some(id) = &tx.id {
        m.insert("id".into(), json!(id));
    }
    m.insert(
        "mutations".into(),
        Value::Array(tx.mutations.iter().map(mutation_to_json).collect()),
    );
    Value::Object(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_patch_mutation_with_options() {
        let m = mutation_from_json(&json!({
            "patch": {
                "id": "doc",
                "patches": [{"type": "set", "path": "a", "value": 1}],
                "options": {"ifRevision": "r1"}
            }
        }))
        .unwrap();
        match &m {
            Mutation::Patch {
                id,
                patches,
                if_revision,
            } => {
                assert_eq!(id, "doc");
                assert_eq!(patches.len(), 1);
                assert_eq!(if_revision.as_deref(), Some("r1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mutation_from_json(&mutation_to_json(&m)).unwrap(), m);
    }

    #[test]
    fn transaction_round_trip() {
        let tx = transaction_from_json(&json!({
            "type": "transaction",
            "id": "tx1",
            "mutations": [
                {"createOrReplace": {"_id": "a", "v": 1}},
                {"delete": {"id": "b"}}
            ]
        }))
        .unwrap();
        assert_eq!(tx.id.as_deref(), Some("tx1"));
        assert_eq!(tx.mutations.len(), 2);
        assert_eq!(transaction_from_json(&transaction_to_json(&tx)).unwrap(), tx);
    }

    #[test]
    fn bare_mutation_arrays_are_transactions() {
        let tx = transaction_from_json(&json!([{"delete": {"id": "a"}}])).unwrap();
        assert_eq!(tx.id, None);
        assert_eq!(tx.mutations, vec![Mutation::delete("a")]);
    }

    #[test]
    fn rejects_malformed_mutations() {
        for bad in [
            json!({"create": {"_id": "a"}, "delete": {"id": "a"}}),
            json!({"delete": {}}),
            json!({"create": "doc"}),
            json!({"rename": {"id": "a"}}),
            json!({"patch": {"id": "a", "options": {"ifRevision": 3}}}),
        ] {
            assert!(mutation_from_json(&bad).is_err(), "accepted {bad}");
        }
        assert!(transaction_from_json(&json!({"type": "query", "mutations": []})).is_err());
    }
}

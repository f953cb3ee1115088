//! JSON codec for patches.
//!
//! Wire form: `{"type": "set", "path": "a.b", "value": 1}`. Paths are either
//! expression strings or segment arrays. `insert` and `upsert` take their
//! locator either as `path` plus `position`, or under the position name
//! itself: `{"type": "insert", "before": "list[0]", "items": [..]}`.

use json_mutator_path::Path;
use serde_json::{json, Map, Number, Value};

use super::types::Patch;
use crate::error::PatchError;
use crate::insert::InsertPosition;

// ── Field helpers ─────────────────────────────────────────────────────────

fn invalid(msg: impl Into<String>) -> PatchError {
    PatchError::InvalidPatch(msg.into())
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str, op: &str) -> Result<&'a Value, PatchError> {
    obj.get(name)
        .ok_or_else(|| invalid(format!("{op} patch is missing `{name}`")))
}

fn decode_path(obj: &Map<String, Value>, op: &str) -> Result<Path, PatchError> {
    Ok(Path::from_json(field(obj, "path", op)?)?)
}

fn decode_amount(obj: &Map<String, Value>, op: &str) -> Result<Number, PatchError> {
    match obj.get("amount").or_else(|| obj.get("value")) {
        None => Ok(Number::from(1)),
        Some(Value::Number(n)) => Ok(n.clone()),
        Some(_) => Err(invalid(format!("{op} amount must be a number"))),
    }
}

fn decode_items(obj: &Map<String, Value>, op: &str) -> Result<Vec<Value>, PatchError> {
    match field(obj, "items", op)? {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(invalid(format!("{op} items must be an array"))),
    }
}

fn decode_index(obj: &Map<String, Value>, name: &str) -> Result<usize, PatchError> {
    field(obj, name, "move")?
        .as_u64()
        .map(|i| i as usize)
        .ok_or_else(|| invalid(format!("move `{name}` must be a non-negative integer")))
}

/// Locator path and position, from either `path` + `position` or a
/// `before`/`after`/`replace` field.
fn decode_locator(
    obj: &Map<String, Value>,
    op: &str,
    default: Option<InsertPosition>,
) -> Result<(Path, InsertPosition), PatchError> {
    for position in [
        InsertPosition::Before,
        InsertPosition::After,
        InsertPosition::Replace,
    ] {
        if let Some(path) = obj.get(position.as_str()) {
            return Ok((Path::from_json(path)?, position));
        }
    }
    let path = decode_path(obj, op)?;
    let position = match obj.get("position") {
        Some(Value::String(s)) => s.parse().map_err(invalid)?,
        Some(_) => return Err(invalid(format!("{op} position must be a string"))),
        None => default.ok_or_else(|| invalid(format!("{op} patch is missing `position`")))?,
    };
    Ok((path, position))
}

// ── Deserialization ───────────────────────────────────────────────────────

/// Decode a single patch from its wire form.
pub fn from_json(v: &Value) -> Result<Patch, PatchError> {
    let obj = v
        .as_object()
        .ok_or_else(|| invalid("patch must be an object"))?;
    let op = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("patch is missing `type`"))?;

    match op {
        "set" => Ok(Patch::Set {
            path: decode_path(obj, op)?,
            value: field(obj, "value", op)?.clone(),
        }),
        "setIfMissing" => Ok(Patch::SetIfMissing {
            path: decode_path(obj, op)?,
            value: field(obj, "value", op)?.clone(),
        }),
        "unset" => Ok(Patch::Unset {
            path: decode_path(obj, op)?,
        }),
        "inc" => Ok(Patch::Inc {
            path: decode_path(obj, op)?,
            amount: decode_amount(obj, op)?,
        }),
        "dec" => Ok(Patch::Dec {
            path: decode_path(obj, op)?,
            amount: decode_amount(obj, op)?,
        }),
        "diffMatchPatch" => {
            let patch = field(obj, "value", op)?
                .as_str()
                .ok_or_else(|| invalid("diffMatchPatch value must be a string"))?;
            Ok(Patch::DiffMatchPatch {
                path: decode_path(obj, op)?,
                patch: patch.to_string(),
            })
        }
        "insert" => {
            let (path, position) = decode_locator(obj, op, None)?;
            Ok(Patch::Insert {
                path,
                position,
                items: decode_items(obj, op)?,
            })
        }
        "replace" => {
            let (path, _) = decode_locator(obj, op, Some(InsertPosition::Replace))?;
            Ok(Patch::Insert {
                path,
                position: InsertPosition::Replace,
                items: decode_items(obj, op)?,
            })
        }
        "upsert" => {
            let (path, position) = decode_locator(obj, op, Some(InsertPosition::After))?;
            Ok(Patch::Upsert {
                path,
                position,
                items: decode_items(obj, op)?,
            })
        }
        "truncate" => Ok(Patch::Truncate {
            path: decode_path(obj, op)?,
        }),
        "move" => Ok(Patch::Move {
            path: decode_path(obj, op)?,
            from: decode_index(obj, "from")?,
            to: decode_index(obj, "to")?,
        }),
        other => Err(invalid(format!("unknown patch type: {other}"))),
    }
}

/// Decode a JSON array of patches.
pub fn from_json_patches(v: &Value) -> Result<Vec<Patch>, PatchError> {
    v.as_array()
        .ok_or_else(|| invalid("patches must be an array"))?
        .iter()
        .map(from_json)
        .collect()
}

// ── Serialization ─────────────────────────────────────────────────────────

/// Encode a patch in its wire form.
pub fn to_json(patch: &Patch) -> Value {
    let op = patch.op_name();
    let path = patch.path().to_json();
    match patch {
        Patch::Set { value, .. } | Patch::SetIfMissing { value, .. } => json!({
            "type": op,
            "path": path,
            "value": value
        }),
        Patch::Unset { .. } | Patch::Truncate { .. } => json!({ "type": op, "path": path }),
        Patch::Inc { amount, .. } | Patch::Dec { amount, .. } => json!({
            "type": op,
            "path": path,
            "amount": amount
        }),
        Patch::DiffMatchPatch { patch: text, .. } => json!({
            "type": op,
            "path": path,
            "value": text
        }),
        Patch::Insert {
            position: InsertPosition::Replace,
            items,
            ..
        } => json!({
            "type": op,
            "path": path,
            "items": items
        }),
        Patch::Insert {
            position, items, ..
        }
        | Patch::Upsert {
            position, items, ..
        } => json!({
            "type": op,
            "path": path,
            "position": position.as_str(),
            "items": items
        }),
        Patch::Move { from, to, .. } => json!({
            "type": op,
            "path": path,
            "from": from,
            "to": to
        }),
    }
}

/// Encode a list of patches as a JSON array.
pub fn to_json_patches(patches: &[Patch]) -> Value {
    Value::Array(patches.iter().map(to_json).collect())
}

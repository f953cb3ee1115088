//! Structural read, write and delete at a concrete path.
//!
//! Writers take the document by value and hand back the updated one; a caller
//! that still needs the previous state keeps its own clone.

use json_mutator_path::util::{index_for_key, resolve_index};
use json_mutator_path::{Path, PathSegment};
use serde_json::{Map, Value};

use crate::error::PatchError;

fn ensure_concrete(path: &Path) -> Result<(), PatchError> {
    if path.is_concrete() {
        Ok(())
    } else {
        Err(PatchError::AmbiguousPath { path: path.clone() })
    }
}

/// Reads the value at `path`. `Ok(None)` when any segment does not resolve.
pub fn get_deep<'a>(doc: &'a Value, path: &Path) -> Result<Option<&'a Value>, PatchError> {
    ensure_concrete(path)?;
    Ok(json_mutator_path::util::get(doc, path))
}

/// Mutable counterpart of [`get_deep`] for in-crate appliers.
pub(crate) fn get_deep_mut<'a>(doc: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in &path.segments {
        current = match (segment, current) {
            (PathSegment::Key(name), Value::Object(map)) => map.get_mut(name)?,
            (PathSegment::Index(i), Value::Array(items)) => {
                let idx = resolve_index(*i, items.len())?;
                &mut items[idx]
            }
            (PathSegment::Keyed(key), Value::Array(items)) => {
                let idx = index_for_key(items, key)?;
                &mut items[idx]
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Farthest a write may land past the end of an array.
pub const MAX_PADDING: usize = 10_000;

/// Writes `value` at `path`, creating missing containers on the way.
///
/// Objects are created for property segments and arrays for index segments;
/// arrays are padded with `null` up to the written index, at most
/// [`MAX_PADDING`] slots. A keyed segment that finds no element appends one
/// when it is the last segment and does nothing otherwise. Containers are
/// only created when the write below them lands.
pub fn set_deep(mut doc: Value, path: &Path, value: Value) -> Result<Value, PatchError> {
    ensure_concrete(path)?;
    if path.is_empty() {
        return Ok(value);
    }
    set_in(&mut doc, &path.segments, value)?;
    Ok(doc)
}

/// Returns whether anything was written.
fn set_in(
    target: &mut Value,
    segments: &[PathSegment],
    value: Value,
) -> Result<bool, PatchError> {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return Ok(true);
    };

    match head {
        PathSegment::Key(name) => {
            let Value::Object(map) = target else {
                return set_fresh(target, Value::Object(Map::new()), segments, value);
            };
            if let Some(child) = map.get_mut(name) {
                return set_in(child, rest, value);
            }
            let mut child = Value::Null;
            let wrote = set_in(&mut child, rest, value)?;
            if wrote {
                map.insert(name.clone(), child);
            }
            Ok(wrote)
        }
        PathSegment::Index(i) => {
            let Value::Array(items) = target else {
                return set_fresh(target, Value::Array(Vec::new()), segments, value);
            };
            let idx = if *i < 0 {
                match resolve_index(*i, items.len()) {
                    Some(idx) => idx,
                    None => return Ok(false),
                }
            } else {
                *i as usize
            };
            if idx < items.len() {
                return set_in(&mut items[idx], rest, value);
            }
            if idx - items.len() > MAX_PADDING {
                return Err(PatchError::InvalidPatch(format!(
                    "index {i} is more than {MAX_PADDING} past the end of an array of {} items",
                    items.len()
                )));
            }
            let mut child = Value::Null;
            let wrote = set_in(&mut child, rest, value)?;
            if wrote {
                items.resize(idx, Value::Null);
                items.push(child);
            }
            Ok(wrote)
        }
        PathSegment::Keyed(key) => {
            let Value::Array(items) = target else {
                return Ok(false);
            };
            match index_for_key(items, key) {
                Some(idx) => set_in(&mut items[idx], rest, value),
                None if rest.is_empty() => {
                    items.push(stamp_key(value, key));
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        PathSegment::Range(..) | PathSegment::Wildcard | PathSegment::Union(_) => Ok(false),
    }
}

/// Replaces `target` with `container` if the write into it lands.
fn set_fresh(
    target: &mut Value,
    mut container: Value,
    segments: &[PathSegment],
    value: Value,
) -> Result<bool, PatchError> {
    let wrote = set_in(&mut container, segments, value)?;
    if wrote {
        *target = container;
    }
    Ok(wrote)
}

/// A value appended through a keyed segment carries that key.
fn stamp_key(mut value: Value, key: &str) -> Value {
    if let Value::Object(map) = &mut value {
        if !map.contains_key("_key") {
            map.insert("_key".to_string(), Value::String(key.to_string()));
        }
    }
    value
}

/// Removes the value at `path`. Unresolvable paths leave the document as is.
pub fn unset_deep(mut doc: Value, path: &Path) -> Result<Value, PatchError> {
    ensure_concrete(path)?;
    if let Some((parent, last)) = path.split_last() {
        if let Some(container) = get_deep_mut(&mut doc, &parent) {
            remove_child(container, last);
        }
    }
    Ok(doc)
}

/// Removes one child from an object or array. Returns the removed value.
pub(crate) fn remove_child(container: &mut Value, segment: &PathSegment) -> Option<Value> {
    match (segment, container) {
        (PathSegment::Key(name), Value::Object(map)) => map.shift_remove(name),
        (PathSegment::Index(i), Value::Array(items)) => {
            resolve_index(*i, items.len()).map(|idx| items.remove(idx))
        }
        (PathSegment::Keyed(key), Value::Array(items)) => {
            index_for_key(items, key).map(|idx| items.remove(idx))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn get_returns_none_for_unresolvable() {
        let doc = json!({"a": {"b": [1, 2]}});
        assert_eq!(get_deep(&doc, &p("a.b[1]")).unwrap(), Some(&json!(2)));
        assert_eq!(get_deep(&doc, &p("a.c.d")).unwrap(), None);
        assert_eq!(get_deep(&doc, &p("a.b.c")).unwrap(), None);
    }

    #[test]
    fn ambiguous_paths_are_rejected() {
        let doc = json!({"a": [1]});
        assert!(matches!(
            get_deep(&doc, &p("a[*]")),
            Err(PatchError::AmbiguousPath { .. })
        ));
        assert!(set_deep(doc.clone(), &p("a[0:1]"), json!(0)).is_err());
        assert!(unset_deep(doc, &p("a[0,1]")).is_err());
    }

    #[test]
    fn set_creates_containers_and_pads() {
        let doc = set_deep(json!({}), &p("a.b[2].c"), json!(true)).unwrap();
        assert_eq!(doc, json!({"a": {"b": [null, null, {"c": true}]}}));
    }

    #[test]
    fn set_leaves_siblings_alone() {
        let doc = json!({"name": {"first": "a", "last": "b"}});
        let out = set_deep(doc.clone(), &p("name.first"), json!("c")).unwrap();
        assert_eq!(out, json!({"name": {"first": "c", "last": "b"}}));
        assert_eq!(doc["name"]["first"], json!("a"));
    }

    #[test]
    fn set_negative_index_overwrites_from_end() {
        let doc = set_deep(json!([1, 2, 3]), &p("[-1]"), json!(9)).unwrap();
        assert_eq!(doc, json!([1, 2, 9]));
        let unchanged = set_deep(json!([1]), &p("[-5]"), json!(9)).unwrap();
        assert_eq!(unchanged, json!([1]));
    }

    #[test]
    fn set_keyed_missing_terminal_appends_with_key() {
        let doc = json!({"items": [{"_key": "a", "v": 1}]});
        let out = set_deep(doc, &p(r#"items[_key=="b"]"#), json!({"v": 2})).unwrap();
        assert_eq!(
            out,
            json!({"items": [{"_key": "a", "v": 1}, {"v": 2, "_key": "b"}]})
        );
    }

    #[test]
    fn set_keyed_missing_non_terminal_is_noop() {
        let doc = json!({"items": [{"_key": "a"}]});
        let out = set_deep(doc.clone(), &p(r#"items[_key=="b"].v"#), json!(1)).unwrap();
        assert_eq!(out, doc);
    }

    #[test]
    fn set_leaves_no_container_behind_when_nothing_lands() {
        let doc = json!({"title": "x", "n": 5});
        for path in [r#"items[_key=="a"].v"#, "list[-1].x", "deep.er[-2]", "n[-1]"] {
            let out = set_deep(doc.clone(), &p(path), json!(1)).unwrap();
            assert_eq!(out, doc, "{path}");
        }
    }

    #[test]
    fn set_far_past_the_end_is_rejected() {
        let doc = json!({"a": []});
        for path in ["a[9223372036854775807]", "a[10000000000]", "b[10001].c"] {
            let err = set_deep(doc.clone(), &p(path), json!(1)).unwrap_err();
            assert!(matches!(err, PatchError::InvalidPatch(_)), "{path}");
        }
        let out = set_deep(doc, &p("a[3]"), json!(1)).unwrap();
        assert_eq!(out, json!({"a": [null, null, null, 1]}));
    }

    #[test]
    fn set_root_replaces_document() {
        assert_eq!(set_deep(json!({"a": 1}), &Path::root(), json!(5)).unwrap(), json!(5));
    }

    #[test]
    fn unset_removes_and_tolerates_missing() {
        let doc = json!({"a": 1, "b": [1, 2, 3], "c": [{"_key": "k"}]});
        let doc = unset_deep(doc, &p("a")).unwrap();
        let doc = unset_deep(doc, &p("b[-1]")).unwrap();
        let doc = unset_deep(doc, &p(r#"c[_key=="k"]"#)).unwrap();
        let doc = unset_deep(doc, &p("x.y.z")).unwrap();
        assert_eq!(doc, json!({"b": [1, 2], "c": []}));
    }
}

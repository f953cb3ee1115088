//! Patch application.
//!
//! Every patch is expanded against the current document first: value
//! operations run once per matched (or creatable) location, array operations
//! once per matched array. The operation at each location is chosen by the
//! runtime [`ValueKind`] found there.

use std::borrow::Cow;
use std::cmp::Ordering;

use json_mutator_path::util::{get, to_indexed};
use json_mutator_path::{json_match, match_targets, Path, PathSegment};
use serde_json::{Number, Value};
use tracing::trace;

use super::types::{Patch, ValueKind};
use crate::deep::{get_deep_mut, set_deep, unset_deep};
use crate::error::PatchError;
use crate::insert::{insert_items, truncate_items, upsert_items};
use crate::keys::{ensure_array_keys_deep, KeyGenerator, RandomKeys};
use crate::text::{merge_hunks, parse_patch, TextPatchError, TextPatchOptions};

/// Applies patches, keeping array items keyed with keys from `K`.
///
/// Inputs are never modified: [`Applier::apply`] and [`Applier::apply_all`]
/// return a new document and leave the one passed in as it was, also on error.
#[derive(Debug, Clone)]
pub struct Applier<K = RandomKeys> {
    keys: K,
    text: TextPatchOptions,
}

impl Default for Applier<RandomKeys> {
    fn default() -> Self {
        Self::new(RandomKeys::default())
    }
}

impl<K: KeyGenerator> Applier<K> {
    pub fn new(keys: K) -> Self {
        Self {
            keys,
            text: TextPatchOptions::default(),
        }
    }

    pub fn with_text_options(mut self, text: TextPatchOptions) -> Self {
        self.text = text;
        self
    }

    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    pub fn apply(&mut self, doc: &Value, patch: &Patch) -> Result<Value, PatchError> {
        let mut out = doc.clone();
        self.apply_in_place(&mut out, patch)?;
        Ok(out)
    }

    /// Applies `patches` in order. The first failure aborts the whole batch
    /// and nothing is returned but the error.
    ///
    /// A caller that wants to keep the patches applied before a failure
    /// calls [`Applier::apply`] once per patch and decides what to do with
    /// the partial result itself.
    pub fn apply_all(&mut self, doc: &Value, patches: &[Patch]) -> Result<Value, PatchError> {
        let mut out = doc.clone();
        for patch in patches {
            self.apply_in_place(&mut out, patch)?;
        }
        Ok(out)
    }

    /// Gives every object in an array of objects a `_key`.
    pub fn normalize_keys(&mut self, doc: &mut Value) {
        let keyed = match ensure_array_keys_deep(doc, &mut self.keys) {
            Cow::Owned(keyed) => Some(keyed),
            Cow::Borrowed(_) => None,
        };
        if let Some(keyed) = keyed {
            *doc = keyed;
        }
    }

    /// Keys the new array items a patch carries, before it is shared.
    pub fn normalize_patch_keys(&mut self, patch: &mut Patch) {
        match patch {
            Patch::Set { value, .. } | Patch::SetIfMissing { value, .. } => {
                self.normalize_keys(value)
            }
            Patch::Insert { items, .. } | Patch::Upsert { items, .. } => {
                let mut list = Value::Array(std::mem::take(items));
                self.normalize_keys(&mut list);
                if let Value::Array(list) = list {
                    *items = list;
                }
            }
            _ => {}
        }
    }

    /// Applies one patch to a working copy the caller owns.
    pub(crate) fn apply_in_place(&mut self, doc: &mut Value, patch: &Patch) -> Result<(), PatchError> {
        trace!(op = patch.op_name(), path = %patch.path(), "applying patch");
        match patch {
            Patch::Unset { path } => unset_matches(doc, path)?,
            Patch::Insert {
                path,
                position,
                items,
            } => {
                for (array, locator) in locator_targets(doc, path, patch.op_name())? {
                    if let Some(Value::Array(arr)) = get_deep_mut(doc, &array) {
                        insert_items(arr, *position, &locator, items.clone());
                    }
                }
            }
            Patch::Upsert {
                path,
                position,
                items,
            } => {
                for (array, locator) in locator_targets(doc, path, "upsert")? {
                    if let Some(Value::Array(arr)) = get_deep_mut(doc, &array) {
                        upsert_items(arr, *position, &locator, items.clone());
                    }
                }
            }
            Patch::Truncate { path } => {
                for (array, locator) in locator_targets(doc, path, "truncate")? {
                    let (from, to) = match locator {
                        PathSegment::Range(from, to) => (from, to),
                        PathSegment::Index(from) => (Some(from), None),
                        other => {
                            return Err(PatchError::InvalidPatch(format!(
                                "truncate needs a range, found `{}`",
                                Path::new(vec![other])
                            )))
                        }
                    };
                    if let Some(Value::Array(arr)) = get_deep_mut(doc, &array) {
                        truncate_items(arr, from, to);
                    }
                }
            }
            Patch::Move { path, from, to } => {
                for array in array_targets(doc, path, "move")? {
                    if let Some(Value::Array(arr)) = get_deep_mut(doc, &array) {
                        if *from < arr.len() {
                            let item = arr.remove(*from);
                            let at = (*to).min(arr.len());
                            arr.insert(at, item);
                        }
                    }
                }
            }
            _ => {
                let targets: Vec<Path> = match_targets(doc, patch.path())
                    .into_iter()
                    .map(|t| t.path)
                    .collect();
                for target in &targets {
                    self.apply_at(doc, target, patch)?;
                }
            }
        }
        if patch.moves_items() {
            self.normalize_keys(doc);
        }
        Ok(())
    }

    /// Runs a value operation at one concrete location.
    fn apply_at(&mut self, doc: &mut Value, path: &Path, patch: &Patch) -> Result<(), PatchError> {
        let kind = ValueKind::of(get(doc, path));
        match (patch, kind) {
            (Patch::Set { value, .. }, _) => write(doc, path, value.clone()),
            (Patch::SetIfMissing { value, .. }, ValueKind::Missing) => {
                write(doc, path, value.clone())
            }
            (Patch::SetIfMissing { .. }, _) => Ok(()),
            (
                Patch::Inc { .. } | Patch::Dec { .. } | Patch::DiffMatchPatch { .. },
                ValueKind::Missing,
            ) => Ok(()),
            (Patch::Inc { amount, .. }, ValueKind::Number) => step_number(doc, path, amount, false),
            (Patch::Dec { amount, .. }, ValueKind::Number) => step_number(doc, path, amount, true),
            (Patch::Inc { .. } | Patch::Dec { .. }, _) => {
                Err(mismatch(doc, path, patch.op_name(), "number"))
            }
            (Patch::DiffMatchPatch { patch: text, .. }, ValueKind::String) => {
                self.merge_text(doc, path, text)
            }
            (Patch::DiffMatchPatch { .. }, _) => Err(mismatch(doc, path, "diffMatchPatch", "string")),
            _ => Err(PatchError::InvalidPatch(format!(
                "{} cannot target a single value",
                patch.op_name()
            ))),
        }
    }

    fn merge_text(&self, doc: &mut Value, path: &Path, text: &str) -> Result<(), PatchError> {
        let hunks = parse_patch(text).map_err(|e| PatchError::InvalidPatch(e.to_string()))?;
        let Some(Value::String(current)) = get_deep_mut(doc, path) else {
            return Ok(());
        };
        match merge_hunks(current, &hunks, &self.text) {
            Ok(merged) => {
                *current = merged;
                Ok(())
            }
            Err(TextPatchError::Unmatched { hunk, .. }) => Err(PatchError::PatchApplication {
                path: path.clone(),
                patch: hunk,
            }),
            Err(other) => Err(PatchError::InvalidPatch(other.to_string())),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn write(doc: &mut Value, path: &Path, value: Value) -> Result<(), PatchError> {
    *doc = set_deep(std::mem::take(doc), path, value)?;
    Ok(())
}

fn mismatch(doc: &Value, path: &Path, op: &'static str, expected: &'static str) -> PatchError {
    PatchError::type_mismatch(op, path, expected, get(doc, path).unwrap_or(&Value::Null))
}

fn step_number(doc: &mut Value, path: &Path, amount: &Number, negate: bool) -> Result<(), PatchError> {
    let Some(Value::Number(current)) = get_deep_mut(doc, path) else {
        return Ok(());
    };
    let next = add_numbers(current, amount, negate).ok_or_else(|| {
        PatchError::InvalidPatch(format!("numeric result out of range at `{path}`"))
    })?;
    *current = next;
    Ok(())
}

/// Integer arithmetic while both sides are integers and the result fits,
/// float arithmetic otherwise.
fn add_numbers(current: &Number, amount: &Number, negate: bool) -> Option<Number> {
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        let sum = if negate { a.checked_sub(b) } else { a.checked_add(b) };
        if let Some(sum) = sum {
            return Some(Number::from(sum));
        }
    }
    let (a, b) = (current.as_f64()?, amount.as_f64()?);
    Number::from_f64(if negate { a - b } else { a + b })
}

/// Existing arrays addressed by `path`.
fn array_targets(doc: &Value, path: &Path, op: &'static str) -> Result<Vec<Path>, PatchError> {
    json_match(doc, path)
        .into_iter()
        .map(|m| match m.value {
            Value::Array(_) => Ok(m.path),
            other => Err(PatchError::type_mismatch(op, &m.path, "array", other)),
        })
        .collect()
}

/// Splits `path` into the arrays it addresses and the locator inside them.
fn locator_targets(
    doc: &Value,
    path: &Path,
    op: &'static str,
) -> Result<Vec<(Path, PathSegment)>, PatchError> {
    let (parent, locator) = path
        .split_last()
        .ok_or_else(|| PatchError::InvalidPatch(format!("{op} needs a path into an array")))?;
    Ok(array_targets(doc, &parent, op)?
        .into_iter()
        .map(|array| (array, locator.clone()))
        .collect())
}

/// Removes every match, deepest and highest index first so earlier removals
/// do not shift the positions of later ones.
fn unset_matches(doc: &mut Value, path: &Path) -> Result<(), PatchError> {
    let mut targets: Vec<Path> = json_match(doc, path)
        .into_iter()
        .map(|m| to_indexed(doc, &m.path))
        .collect();
    targets.sort_by(|a, b| compare_paths(b, a));
    targets.dedup();
    for target in &targets {
        *doc = unset_deep(std::mem::take(doc), target)?;
    }
    Ok(())
}

fn compare_paths(a: &Path, b: &Path) -> Ordering {
    a.segments
        .iter()
        .zip(&b.segments)
        .map(|(x, y)| match (x, y) {
            (PathSegment::Index(x), PathSegment::Index(y)) => x.cmp(y),
            (PathSegment::Key(x), PathSegment::Key(y))
            | (PathSegment::Keyed(x), PathSegment::Keyed(y)) => x.cmp(y),
            _ => Ordering::Equal,
        })
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::InsertPosition;
    use serde_json::json;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn applier() -> Applier<impl FnMut() -> String> {
        let mut n = 0;
        Applier::new(move || {
            n += 1;
            format!("k{n}")
        })
    }

    #[test]
    fn set_replaces_a_nested_field() {
        let doc = json!({"name": {"first": "a", "last": "b"}});
        let out = applier().apply(&doc, &Patch::set(p("name.first"), json!("c"))).unwrap();
        assert_eq!(out, json!({"name": {"first": "c", "last": "b"}}));
        assert_eq!(doc, json!({"name": {"first": "a", "last": "b"}}));
    }

    #[test]
    fn set_over_a_wildcard_hits_every_match() {
        let doc = json!({"items": [{"_key": "a", "n": 1}, {"_key": "b", "n": 2}]});
        let out = applier().apply(&doc, &Patch::set(p("items[*].n"), json!(0))).unwrap();
        assert_eq!(out, json!({"items": [{"_key": "a", "n": 0}, {"_key": "b", "n": 0}]}));
    }

    #[test]
    fn set_if_missing_keeps_falsy_values() {
        let doc = json!({"a": 0, "b": false, "c": "", "d": null});
        let mut applier = applier();
        for field in ["a", "b", "c", "d"] {
            let out = applier.apply(&doc, &Patch::set_if_missing(p(field), json!(9))).unwrap();
            assert_eq!(out, doc);
        }
        let out = applier.apply(&doc, &Patch::set_if_missing(p("e"), json!(9))).unwrap();
        assert_eq!(out["e"], json!(9));
    }

    #[test]
    fn inc_and_dec() {
        let doc = json!({"n": 1, "f": 1.5});
        let mut applier = applier();
        let out = applier
            .apply_all(&doc, &[Patch::inc(p("n"), 2), Patch::dec(p("f"), 1)])
            .unwrap();
        assert_eq!(out, json!({"n": 3, "f": 0.5}));
        assert_eq!(applier.apply(&doc, &Patch::inc(p("missing"), 1)).unwrap(), doc);
    }

    #[test]
    fn batch_failure_versus_patch_by_patch() {
        let doc = json!({"n": 1, "s": "x"});
        let patches = [
            Patch::inc(p("n"), 1),
            Patch::inc(p("s"), 1),
            Patch::inc(p("n"), 1),
        ];
        let mut applier = applier();
        assert!(applier.apply_all(&doc, &patches).is_err());

        let mut out = doc.clone();
        let mut failed = Vec::new();
        for (idx, patch) in patches.iter().enumerate() {
            match applier.apply(&out, patch) {
                Ok(next) => out = next,
                Err(_) => failed.push(idx),
            }
        }
        assert_eq!(failed, vec![1]);
        assert_eq!(out, json!({"n": 3, "s": "x"}));
    }

    #[test]
    fn inc_on_a_string_is_a_type_mismatch() {
        let err = applier()
            .apply(&json!({"s": "x"}), &Patch::inc(p("s"), 1))
            .unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { op: "inc", .. }));
    }

    #[test]
    fn unset_removes_higher_indices_first() {
        let doc = json!({"a": [0, 1, 2, 3]});
        let out = applier().apply(&doc, &Patch::unset(p("a[0,2]"))).unwrap();
        assert_eq!(out, json!({"a": [1, 3]}));
        let out = applier().apply(&doc, &Patch::unset(p("a[2,0]"))).unwrap();
        assert_eq!(out, json!({"a": [1, 3]}));
    }

    #[test]
    fn unset_missing_is_noop() {
        let doc = json!({"a": 1});
        assert_eq!(applier().apply(&doc, &Patch::unset(p("b.c"))).unwrap(), doc);
    }

    #[test]
    fn insert_stamps_keys_on_new_objects() {
        let doc = json!({"list": [{"_key": "a"}]});
        let out = applier()
            .apply(
                &doc,
                &Patch::insert(p("list[_key==\"a\"]"), InsertPosition::After, vec![json!({"v": 1})]),
            )
            .unwrap();
        assert_eq!(out, json!({"list": [{"_key": "a"}, {"v": 1, "_key": "k1"}]}));
    }

    #[test]
    fn insert_on_a_non_array_is_a_type_mismatch() {
        let err = applier()
            .apply(
                &json!({"list": "nope"}),
                &Patch::insert(p("list[0]"), InsertPosition::Before, vec![json!(1)]),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { op: "insert", expected: "array", .. }));
    }

    #[test]
    fn diff_match_patch_on_a_number_names_path_and_value() {
        let err = applier()
            .apply(&json!({"title": 3}), &Patch::diff_match_patch(p("title"), "@@ -1 +1 @@\n-3\n+4\n"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("title"), "{message}");
        assert!(message.contains('3'), "{message}");
    }

    #[test]
    fn move_within_an_array() {
        let doc = json!({"a": [1, 2, 3]});
        let patch = Patch::Move {
            path: p("a"),
            from: 0,
            to: 2,
        };
        assert_eq!(applier().apply(&doc, &patch).unwrap(), json!({"a": [2, 3, 1]}));
    }

    #[test]
    fn truncate_needs_a_range() {
        let doc = json!({"a": [1, 2, 3]});
        let out = applier().apply(&doc, &Patch::Truncate { path: p("a[1:]") }).unwrap();
        assert_eq!(out, json!({"a": [1]}));
        let err = applier()
            .apply(&doc, &Patch::Truncate { path: p("a[*]") })
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidPatch(_)));
    }

    #[test]
    fn patch_payloads_are_keyed_once() {
        let mut applier = applier();
        let mut patch = Patch::insert(
            p("list[0]"),
            InsertPosition::Before,
            vec![json!({"v": 1}), json!({"_key": "own"})],
        );
        applier.normalize_patch_keys(&mut patch);
        let Patch::Insert { items, .. } = &patch else {
            unreachable!()
        };
        assert_eq!(items, &vec![json!({"v": 1, "_key": "k1"}), json!({"_key": "own"})]);

        let out = applier.apply(&json!({"list": []}), &patch).unwrap();
        assert_eq!(out["list"][0]["_key"], json!("k1"));
    }

    #[test]
    fn large_integers_fall_back_to_floats() {
        assert_eq!(
            add_numbers(&Number::from(i64::MAX), &Number::from(1), false).and_then(|n| n.as_f64()),
            Some(i64::MAX as f64 + 1.0)
        );
    }
}

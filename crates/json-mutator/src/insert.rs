//! Array splicing for `insert`, `replace`, `upsert` and `truncate`.
//!
//! A locator segment (index, key, range, wildcard or union) may select several
//! elements. `before` inserts at the lowest selected position, `after` behind
//! the highest, and `replace` removes every selected element and inserts where
//! the lowest one was.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use json_mutator_path::util::{index_for_key, range_indices};
use json_mutator_path::PathSegment;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
    Replace,
}

impl InsertPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertPosition::Before => "before",
            InsertPosition::After => "after",
            InsertPosition::Replace => "replace",
        }
    }
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsertPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(InsertPosition::Before),
            "after" => Ok(InsertPosition::After),
            "replace" => Ok(InsertPosition::Replace),
            other => Err(format!("unknown insert position: {other}")),
        }
    }
}

/// Positions in `items` selected by `locator`, ascending and deduplicated.
///
/// Negative indices count from the end. For `before`, a negative index names
/// the gap after that element, so `[-1]` is the end of the array.
pub fn locate(items: &[Value], locator: &PathSegment, position: InsertPosition) -> BTreeSet<usize> {
    let len = items.len();
    let mut found = BTreeSet::new();
    match locator {
        PathSegment::Index(i) => {
            let resolved = match (position, *i < 0) {
                (InsertPosition::Before, true) => len as isize + i + 1,
                (_, true) => len as isize + i,
                (_, false) => *i,
            };
            let upper = if position == InsertPosition::Before { len } else { len.saturating_sub(1) };
            if resolved >= 0 && (resolved as usize) <= upper && (len > 0 || position == InsertPosition::Before) {
                found.insert(resolved as usize);
            }
        }
        PathSegment::Keyed(key) => {
            if let Some(idx) = index_for_key(items, key) {
                found.insert(idx);
            }
        }
        PathSegment::Range(from, to) => found.extend(range_indices(*from, *to, len)),
        PathSegment::Wildcard => found.extend(0..len),
        PathSegment::Union(members) => {
            for member in members {
                found.extend(locate(items, member, position));
            }
        }
        PathSegment::Key(_) => {}
    }
    found
}

/// Splices `new_items` into `items` relative to `locator`.
///
/// Returns `false` and leaves `items` untouched when nothing is selected.
pub fn insert_items(
    items: &mut Vec<Value>,
    position: InsertPosition,
    locator: &PathSegment,
    new_items: Vec<Value>,
) -> bool {
    let selected = locate(items, locator, position);
    let (Some(&lowest), Some(&highest)) = (selected.first(), selected.last()) else {
        return false;
    };
    match position {
        InsertPosition::Before => {
            let _ = items.splice(lowest..lowest, new_items);
        }
        InsertPosition::After => {
            let at = (highest + 1).min(items.len());
            let _ = items.splice(at..at, new_items);
        }
        InsertPosition::Replace => {
            for idx in selected.iter().rev() {
                items.remove(*idx);
            }
            let _ = items.splice(lowest..lowest, new_items);
        }
    }
    true
}

/// Replaces elements whose `_key` matches an incoming item and inserts the
/// rest relative to `locator`. Returns `true` if anything changed.
pub fn upsert_items(
    items: &mut Vec<Value>,
    position: InsertPosition,
    locator: &PathSegment,
    new_items: Vec<Value>,
) -> bool {
    let mut changed = false;
    let mut missing = Vec::new();
    for item in new_items {
        let existing = item
            .get("_key")
            .and_then(Value::as_str)
            .and_then(|key| index_for_key(items, key));
        match existing {
            Some(idx) => {
                items[idx] = item;
                changed = true;
            }
            None => missing.push(item),
        }
    }
    if missing.is_empty() {
        return changed;
    }
    if insert_items(items, position, locator, missing.clone()) {
        return true;
    }
    // Nothing to anchor on: append, so no item is lost.
    items.extend(missing);
    true
}

/// Removes the elements in `[from:to]`. Returns `true` if anything was removed.
pub fn truncate_items(items: &mut Vec<Value>, from: Option<isize>, to: Option<isize>) -> bool {
    let range = range_indices(from, to, items.len());
    if range.is_empty() {
        return false;
    }
    items.drain(range);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arr(v: Value) -> Vec<Value> {
        match v {
            Value::Array(items) => items,
            _ => unreachable!(),
        }
    }

    #[test]
    fn before_uses_lowest_and_after_uses_highest() {
        let both = PathSegment::Union(vec![PathSegment::Index(0), PathSegment::Index(2)]);

        let mut items = arr(json!(["a", "b", "c"]));
        assert!(insert_items(&mut items, InsertPosition::Before, &both, vec![json!("!")]));
        assert_eq!(items, arr(json!(["!", "a", "b", "c"])));

        let mut items = arr(json!(["a", "b", "c"]));
        assert!(insert_items(&mut items, InsertPosition::After, &both, vec![json!("!")]));
        assert_eq!(items, arr(json!(["a", "b", "c", "!"])));
    }

    #[test]
    fn before_negative_one_appends() {
        let mut items = arr(json!(["a", "b", "c"]));
        assert!(insert_items(
            &mut items,
            InsertPosition::Before,
            &PathSegment::Index(-1),
            vec![json!("!")]
        ));
        assert_eq!(items, arr(json!(["a", "b", "c", "!"])));
    }

    #[test]
    fn before_on_empty_array() {
        let mut items = Vec::new();
        assert!(insert_items(&mut items, InsertPosition::Before, &PathSegment::Index(0), vec![json!(1)]));
        assert_eq!(items, vec![json!(1)]);
    }

    #[test]
    fn after_negative_counts_from_end() {
        let mut items = arr(json!(["a", "b", "c"]));
        insert_items(&mut items, InsertPosition::After, &PathSegment::Index(-2), vec![json!("!")]);
        assert_eq!(items, arr(json!(["a", "b", "!", "c"])));
    }

    #[test]
    fn replace_removes_all_selected() {
        let mut items = arr(json!(["a", "b", "c", "d"]));
        let sel = PathSegment::Union(vec![PathSegment::Index(3), PathSegment::Index(1)]);
        assert!(insert_items(&mut items, InsertPosition::Replace, &sel, vec![json!("x"), json!("y")]));
        assert_eq!(items, arr(json!(["a", "x", "y", "c"])));
    }

    #[test]
    fn replace_range() {
        let mut items = arr(json!([1, 2, 3, 4, 5]));
        insert_items(&mut items, InsertPosition::Replace, &PathSegment::Range(Some(1), Some(4)), vec![json!(0)]);
        assert_eq!(items, arr(json!([1, 0, 5])));
    }

    #[test]
    fn missing_reference_is_noop() {
        let mut items = arr(json!([{"_key": "a"}]));
        let before = items.clone();
        assert!(!insert_items(
            &mut items,
            InsertPosition::After,
            &PathSegment::Keyed("zz".into()),
            vec![json!({})]
        ));
        assert!(!insert_items(&mut items, InsertPosition::After, &PathSegment::Index(5), vec![json!({})]));
        assert_eq!(items, before);
    }

    #[test]
    fn upsert_replaces_known_and_inserts_new() {
        let mut items = arr(json!([{"_key": "a", "v": 1}, {"_key": "b", "v": 2}]));
        upsert_items(
            &mut items,
            InsertPosition::After,
            &PathSegment::Keyed("a".into()),
            vec![json!({"_key": "b", "v": 20}), json!({"_key": "c", "v": 3})],
        );
        assert_eq!(
            items,
            arr(json!([{"_key": "a", "v": 1}, {"_key": "c", "v": 3}, {"_key": "b", "v": 20}]))
        );
    }

    #[test]
    fn truncate_suffix() {
        let mut items = arr(json!([1, 2, 3, 4]));
        assert!(truncate_items(&mut items, Some(2), None));
        assert_eq!(items, arr(json!([1, 2])));
        assert!(!truncate_items(&mut items, Some(5), None));
    }

    #[test]
    fn position_names() {
        assert_eq!("before".parse::<InsertPosition>(), Ok(InsertPosition::Before));
        assert_eq!(InsertPosition::Replace.to_string(), "replace");
        assert!("around".parse::<InsertPosition>().is_err());
    }
}

//! Helpers shared by the matcher and the deep accessors.

use serde_json::Value;

use crate::types::{Path, PathSegment};

/// Returns true if `name` can be printed without brackets.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Position of the first array element whose `_key` equals `key`.
pub fn index_for_key(items: &[Value], key: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| item.get("_key").and_then(Value::as_str) == Some(key))
}

/// Resolves a possibly negative index against an array length.
pub fn resolve_index(index: isize, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as isize + index } else { index };
    if resolved < 0 || resolved as usize >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Indices selected by `[from:to]`, end exclusive and clamped to the array.
pub fn range_indices(from: Option<isize>, to: Option<isize>, len: usize) -> std::ops::Range<usize> {
    let len_i = len as isize;
    let clamp = |i: isize| -> usize {
        let i = if i < 0 { len_i + i } else { i };
        i.clamp(0, len_i) as usize
    };
    let start = from.map(clamp).unwrap_or(0);
    let end = to.map(clamp).unwrap_or(len);
    if start >= end {
        start..start
    } else {
        start..end
    }
}

/// Resolves one concrete segment against a container, by reference.
pub fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (segment, value) {
        (PathSegment::Key(name), Value::Object(map)) => map.get(name),
        (PathSegment::Index(i), Value::Array(items)) => {
            resolve_index(*i, items.len()).map(|i| &items[i])
        }
        (PathSegment::Keyed(key), Value::Array(items)) => {
            index_for_key(items, key).map(|i| &items[i])
        }
        _ => None,
    }
}

/// Resolves a concrete path. Non-concrete segments never resolve.
pub fn get<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments
        .iter()
        .try_fold(doc, |value, segment| step(value, segment))
}

/// Rewrites keyed segments into the indices they currently resolve to.
///
/// Segments that do not resolve are left untouched.
pub fn to_indexed(doc: &Value, path: &Path) -> Path {
    let mut current = Some(doc);
    let mut out = Vec::with_capacity(path.len());
    for segment in &path.segments {
        let rewritten = match (segment, current) {
            (PathSegment::Keyed(key), Some(Value::Array(items))) => index_for_key(items, key)
                .map(|i| PathSegment::Index(i as isize))
                .unwrap_or_else(|| segment.clone()),
            (PathSegment::Index(i), Some(Value::Array(items))) => resolve_index(*i, items.len())
                .map(|i| PathSegment::Index(i as isize))
                .unwrap_or_else(|| segment.clone()),
            _ => segment.clone(),
        };
        current = current.and_then(|v| step(v, segment));
        out.push(rewritten);
    }
    Path::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers() {
        assert!(is_identifier("title"));
        assert!(is_identifier("_key"));
        assert!(is_identifier("$type"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(3, 3), None);
    }

    #[test]
    fn ranges_clamp() {
        assert_eq!(range_indices(Some(1), None, 4), 1..4);
        assert_eq!(range_indices(None, Some(-1), 4), 0..3);
        assert_eq!(range_indices(Some(2), Some(10), 4), 2..4);
        assert!(range_indices(Some(3), Some(1), 4).is_empty());
    }

    #[test]
    fn get_follows_keys() {
        let doc = json!({"items": [{"_key": "a", "n": 1}, {"_key": "b", "n": 2}]});
        let path = Path::parse(r#"items[_key=="b"].n"#).unwrap();
        assert_eq!(get(&doc, &path), Some(&json!(2)));
        assert_eq!(get(&doc, &Path::parse("items[5]").unwrap()), None);
        assert_eq!(get(&doc, &Path::parse("items[*]").unwrap()), None);
    }

    #[test]
    fn keyed_segments_become_indices() {
        let doc = json!({"items": [{"_key": "a"}, {"_key": "b"}]});
        let path = Path::parse(r#"items[_key=="b"]"#).unwrap();
        assert_eq!(to_indexed(&doc, &path).to_string(), "items[1]");
        let missing = Path::parse(r#"items[_key=="zz"]"#).unwrap();
        assert_eq!(to_indexed(&doc, &missing), missing);
    }
}

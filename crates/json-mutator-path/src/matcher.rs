//! Expands path expressions against a document.
//!
//! Every result carries a concrete path: indices are non-negative and ranges,
//! wildcards and unions are resolved. Keyed segments stay keyed so the path
//! survives reordering of the array.

use serde_json::Value;

use crate::types::{Path, PathSegment};
use crate::util::{index_for_key, range_indices, resolve_index};

/// A location that exists in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    pub path: Path,
    pub value: &'a Value,
}

/// A location a write may target. `value` is `None` when nothing is there yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Target<'a> {
    pub path: Path,
    pub value: Option<&'a Value>,
}

/// Finds every existing location addressed by `path`, in document order.
///
/// Missing locations produce no matches.
pub fn json_match<'a>(doc: &'a Value, path: &Path) -> Vec<Match<'a>> {
    let mut results = vec![Match {
        path: Path::root(),
        value: doc,
    }];

    for segment in &path.segments {
        let mut next = Vec::new();
        for current in &results {
            expand(current.value, &current.path, segment, &mut |path, value| {
                next.push(Match { path, value })
            });
        }
        if next.is_empty() {
            return next;
        }
        results = next;
    }

    results
}

/// Like [`json_match`], but also yields locations that a write would create.
///
/// Concrete segments below an existing container are followed even when the
/// child is absent. Ambiguous segments only ever expand over what exists.
pub fn match_targets<'a>(doc: &'a Value, path: &Path) -> Vec<Target<'a>> {
    let mut results = vec![Target {
        path: Path::root(),
        value: Some(doc),
    }];

    for segment in &path.segments {
        let mut next = Vec::new();
        for current in &results {
            match (current.value, segment) {
                (Some(value), s) if !s.is_concrete() => {
                    expand(value, &current.path, s, &mut |path, value| {
                        next.push(Target {
                            path,
                            value: Some(value),
                        })
                    });
                }
                (Some(value), s) => {
                    let mut found = false;
                    expand(value, &current.path, s, &mut |path, value| {
                        found = true;
                        next.push(Target {
                            path,
                            value: Some(value),
                        })
                    });
                    if !found {
                        next.push(Target {
                            path: current.path.child(s.clone()),
                            value: None,
                        });
                    }
                }
                (None, s) if s.is_concrete() => next.push(Target {
                    path: current.path.child(s.clone()),
                    value: None,
                }),
                (None, _) => {}
            }
        }
        results = next;
    }

    results
}

fn expand<'a, F>(value: &'a Value, base: &Path, segment: &PathSegment, emit: &mut F)
where
    F: FnMut(Path, &'a Value),
{
    match segment {
        PathSegment::Key(name) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get(name) {
                    emit(base.child(segment.clone()), child);
                }
            }
        }
        PathSegment::Index(i) => {
            if let Value::Array(items) = value {
                if let Some(idx) = resolve_index(*i, items.len()) {
                    emit(base.child(PathSegment::Index(idx as isize)), &items[idx]);
                }
            }
        }
        PathSegment::Keyed(key) => {
            if let Value::Array(items) = value {
                if let Some(idx) = index_for_key(items, key) {
                    emit(base.child(segment.clone()), &items[idx]);
                }
            }
        }
        PathSegment::Range(from, to) => {
            if let Value::Array(items) = value {
                for idx in range_indices(*from, *to, items.len()) {
                    emit(base.child(PathSegment::Index(idx as isize)), &items[idx]);
                }
            }
        }
        PathSegment::Wildcard => match value {
            Value::Object(map) => {
                for (key, child) in map {
                    emit(base.child(PathSegment::Key(key.clone())), child);
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    emit(base.child(PathSegment::Index(idx as isize)), child);
                }
            }
            _ => {}
        },
        PathSegment::Union(members) => {
            for member in members {
                expand(value, base, member, emit);
            }
        }
    }
}

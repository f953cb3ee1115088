//! Array item keys.
//!
//! Every object inside an array of objects carries a `_key` that identifies it
//! independently of its position. [`ensure_array_keys_deep`] restores that
//! invariant after a write.

use std::borrow::Cow;

use rand::{rngs::OsRng, Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde_json::{Map, Value};

use crate::config::KeyConfig;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Source of fresh item keys.
pub trait KeyGenerator {
    fn next_key(&mut self) -> String;
}

impl<F> KeyGenerator for F
where
    F: FnMut() -> String,
{
    fn next_key(&mut self) -> String {
        self()
    }
}

/// Random lowercase hex keys.
///
/// Seeded generators produce the same sequence every time, which keeps test
/// fixtures stable.
#[derive(Debug, Clone)]
pub struct RandomKeys {
    length: usize,
    rng: Xoshiro256StarStar,
}

impl RandomKeys {
    pub fn new(config: &KeyConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Xoshiro256StarStar::seed_from_u64(seed),
            None => {
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                Xoshiro256StarStar::from_seed(bytes)
            }
        };
        Self {
            length: config.length,
            rng,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(&KeyConfig {
            seed: Some(seed),
            ..KeyConfig::default()
        })
    }
}

impl Default for RandomKeys {
    fn default() -> Self {
        Self::new(&KeyConfig::default())
    }
}

impl KeyGenerator for RandomKeys {
    fn next_key(&mut self) -> String {
        (0..self.length)
            .map(|_| HEX[self.rng.gen_range(0..HEX.len())] as char)
            .collect()
    }
}

/// Gives every object in an array of objects a `_key`, at any depth.
///
/// Existing keys are kept. An array whose first item is a primitive is left
/// alone, as is anything that already satisfies the invariant; in both cases
/// the input is returned borrowed, so callers can tell nothing changed.
pub fn ensure_array_keys_deep<'a, K: KeyGenerator + ?Sized>(
    value: &'a Value,
    keys: &mut K,
) -> Cow<'a, Value> {
    match normalize(value, keys) {
        Some(changed) => Cow::Owned(changed),
        None => Cow::Borrowed(value),
    }
}

/// Returns `None` when `value` needs no change.
fn normalize<K: KeyGenerator + ?Sized>(value: &Value, keys: &mut K) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let mut changed: Option<Map<String, Value>> = None;
            for (i, (name, child)) in map.iter().enumerate() {
                if let Some(new_child) = normalize(child, keys) {
                    let out = changed.get_or_insert_with(|| {
                        map.iter().take(i).map(|(k, v)| (k.clone(), v.clone())).collect()
                    });
                    out.insert(name.clone(), new_child);
                } else if let Some(out) = changed.as_mut() {
                    out.insert(name.clone(), child.clone());
                }
            }
            changed.map(Value::Object)
        }
        Value::Array(items) => {
            match items.first() {
                Some(Value::Object(_)) | Some(Value::Array(_)) => {}
                _ => return None,
            }
            let mut changed: Option<Vec<Value>> = None;
            for (i, item) in items.iter().enumerate() {
                let mut new_item = normalize(item, keys);
                let needs_key = new_item.as_ref().unwrap_or(item).is_object()
                    && item.get("_key").and_then(Value::as_str).is_none();
                if needs_key {
                    let mut stamped = new_item.unwrap_or_else(|| item.clone());
                    if let Value::Object(map) = &mut stamped {
                        map.insert("_key".to_string(), Value::String(keys.next_key()));
                    }
                    new_item = Some(stamped);
                }
                match new_item {
                    Some(new_item) => {
                        let out = changed.get_or_insert_with(|| items[..i].to_vec());
                        out.push(new_item);
                    }
                    None => {
                        if let Some(out) = changed.as_mut() {
                            out.push(item.clone());
                        }
                    }
                }
            }
            changed.map(Value::Array)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("k{n}")
        }
    }

    #[test]
    fn fills_missing_keys_only() {
        let doc = json!({"items": [{"_key": "a"}, {"x": 1}, {"x": 2}]});
        let out = ensure_array_keys_deep(&doc, &mut counter());
        assert_eq!(
            out.into_owned(),
            json!({"items": [{"_key": "a"}, {"x": 1, "_key": "k1"}, {"x": 2, "_key": "k2"}]})
        );
    }

    #[test]
    fn keyed_and_primitive_arrays_are_borrowed() {
        let doc = json!({"tags": ["a", "b"], "items": [{"_key": "a"}], "n": 1});
        assert!(matches!(
            ensure_array_keys_deep(&doc, &mut counter()),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn mixed_array_starting_with_primitive_is_untouched() {
        let doc = json!([1, {"x": 1}]);
        assert!(matches!(
            ensure_array_keys_deep(&doc, &mut counter()),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn nested_arrays_are_walked() {
        let doc = json!({"rows": [{"_key": "r", "cells": [{"v": 1}]}]});
        let out = ensure_array_keys_deep(&doc, &mut counter()).into_owned();
        assert_eq!(out["rows"][0]["cells"][0]["_key"], json!("k1"));
        assert_eq!(out["rows"][0]["_key"], json!("r"));
    }

    #[test]
    fn non_string_key_is_replaced() {
        let doc = json!([{"_key": 7}]);
        let out = ensure_array_keys_deep(&doc, &mut counter()).into_owned();
        assert_eq!(out, json!([{"_key": "k1"}]));
    }

    #[test]
    fn object_order_is_preserved() {
        let doc = json!({"a": 1, "list": [{"v": 1}], "z": 2});
        let out = ensure_array_keys_deep(&doc, &mut counter()).into_owned();
        let names: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(names, vec!["a", "list", "z"]);
    }

    #[test]
    fn random_keys_are_hex_and_reproducible() {
        let mut a = RandomKeys::seeded(7);
        let mut b = RandomKeys::seeded(7);
        for _ in 0..20 {
            let key = a.next_key();
            assert_eq!(key.len(), 12);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            assert_eq!(key, b.next_key());
        }
    }
}

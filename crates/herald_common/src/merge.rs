//! Deep merge for nested JSON documents.
//!
//! Used both to reconcile on-disk documents against the current default
//! schema and to apply partial updates to individual records. Maps merge
//! key-by-key; every other type is replaced by the update side, including
//! a map replacing a scalar or vice versa. Not a three-way merge:
//! overlapping scalar writes are last-write-wins.

use serde_json::Value;

/// Recursion bound. The schema nests four levels deep; past this bound
/// the update side wins outright instead of recursing.
pub const MAX_MERGE_DEPTH: usize = 16;

/// Merge `update` into `base`, update winning at every leaf.
pub fn deep_merge(base: &mut Value, update: Value) {
    merge_bounded(base, update, MAX_MERGE_DEPTH);
}

fn merge_bounded(base: &mut Value, update: Value, depth: usize) {
    match update {
        Value::Object(update_map) if depth > 0 => match base {
            Value::Object(base_map) => {
                for (key, value) in update_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => merge_bounded(existing, value, depth - 1),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
            _ => *base = Value::Object(update_map),
        },
        other => *base = other,
    }
}

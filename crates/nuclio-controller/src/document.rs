// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generic operations on JSON document trees.
//!
//! Function resources are loosely typed documents. The planner needs two
//! structural operations on them: a deep merge (desired onto observed) and a
//! minimal diff (what the merge changed). Both live here so that every call
//! site shares the same notion of equality and emptiness.

use serde_json::{Map, Value};

/// Equality and emptiness predicates used by [`diff_with`].
pub trait Equivalence {
    /// Two values are the same leaf.
    fn equal(&self, left: &Value, right: &Value) -> bool;

    /// A value carries no information.
    fn is_empty(&self, value: &Value) -> bool;
}

/// Default equivalence.
///
/// Absent, `null`, `{}`, `[]` and `""` are all empty. Arrays are compared as
/// whole leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Semantic;

impl Equivalence for Semantic {
    fn equal(&self, left: &Value, right: &Value) -> bool {
        left == right
    }

    fn is_empty(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

/// Deep-merge `overlay` into `target`.
///
/// Objects merge key by key; arrays and scalars in `overlay` replace what
/// `target` holds. `null` overlay values leave `target` untouched.
pub fn merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (_, Value::Null) => {}
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                let nested = value.is_object() && target_map.get(key).is_some_and(Value::is_object);
                if !nested {
                    target_map.insert(key.clone(), value.clone());
                } else if let Some(existing) = target_map.get_mut(key) {
                    merge(existing, value);
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Keys of `left` that differ from `right` under [`Semantic`] equivalence.
pub fn diff(left: &Value, right: &Value) -> Map<String, Value> {
    diff_with(left, right, &Semantic)
}

/// Keys of `left` that differ from `right`.
///
/// Only keys present on the left are inspected. A key is dropped when both
/// sides are equal, when both sides are empty, or when its nested diff is
/// empty. Non-object `left` values yield an empty diff.
pub fn diff_with(left: &Value, right: &Value, eq: &impl Equivalence) -> Map<String, Value> {
    let mut changed = Map::new();
    let Value::Object(left_map) = left else {
        return changed;
    };

    for (key, value) in left_map {
        let other = right.get(key).unwrap_or(&Value::Null);
        if eq.equal(value, other) {
            continue;
        }
        if eq.is_empty(value) && eq.is_empty(other) {
            continue;
        }

        if value.is_object() {
            let nested = diff_with(value, other, eq);
            if !nested.is_empty() {
                changed.insert(key.clone(), Value::Object(nested));
            }
        } else {
            changed.insert(key.clone(), value.clone());
        }
    }

    changed
}

/// Split a dotted path. `\.` stands for a literal dot inside a key.
///
/// ```
/// use nuclio_controller::document::split_path;
///
/// assert_eq!(
///     split_path(r"metadata.annotations.nuclio\.io/secret"),
///     vec!["metadata", "annotations", "nuclio.io/secret"],
/// );
/// ```
pub fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

/// Assign `value` at a dotted path, creating intermediate objects.
///
/// Non-object values along the path are replaced by objects. An empty path
/// is a no-op.
pub fn assign_path(doc: &mut Value, path: &str, value: Value) {
    let segments = split_path(path);
    if segments.is_empty() {
        return;
    }
    assign_segments(doc, &segments, value);
}

fn assign_segments(target: &mut Value, segments: &[String], value: Value) {
    match segments {
        [] => *target = value,
        [head, rest @ ..] => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(head.clone()).or_insert(Value::Null);
                assign_segments(slot, rest, value);
            }
        }
    }
}

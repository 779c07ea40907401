//! Shallow overlay merge
//!
//! Commit-time state merge is key-level only: each top-level key in the
//! delta replaces (or, for the delete sentinel, removes) the corresponding
//! key in the state. Nested values are never merged recursively; a mutation
//! that wants a deep merge must compute the full replacement value itself.

use crate::value::Value;
use std::collections::BTreeMap;

/// Overlay `delta` onto `state`, key by key
///
/// A key mapped to [`Value::delete_marker`] is removed from `state`;
/// every other key is inserted, replacing any existing value wholesale.
pub fn merge_overlay(state: &mut BTreeMap<String, Value>, delta: &BTreeMap<String, Value>) {
    for (key, value) in delta {
        if value.is_delete_marker() {
            state.remove(key);
        } else {
            state.insert(key.clone(), value.clone());
        }
    }
}

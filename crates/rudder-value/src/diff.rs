//! Structural diff engine
//!
//! Computes a path-addressed difference between two values. Traversal is
//! deterministic: map keys in sorted order (the `BTreeMap` representation
//! guarantees this), list elements by ascending index. The same pair of
//! inputs always produces the same entry sequence.

use crate::path::ValuePath;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Classification of one difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    /// Present only on the right side
    Added,
    /// Present only on the left side
    Removed,
    /// Present on both sides with different values
    Modified,
}

/// One path-addressed difference between two values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Location of the difference
    pub path: ValuePath,
    /// What changed
    pub kind: DiffKind,
    /// Left-side value (`Removed` and `Modified`)
    pub before: Option<Value>,
    /// Right-side value (`Added` and `Modified`)
    pub after: Option<Value>,
}

impl DiffEntry {
    fn added(path: ValuePath, after: &Value) -> Self {
        Self {
            path,
            kind: DiffKind::Added,
            before: None,
            after: Some(after.clone()),
        }
    }

    fn removed(path: ValuePath, before: &Value) -> Self {
        Self {
            path,
            kind: DiffKind::Removed,
            before: Some(before.clone()),
            after: None,
        }
    }

    fn modified(path: ValuePath, before: &Value, after: &Value) -> Self {
        Self {
            path,
            kind: DiffKind::Modified,
            before: Some(before.clone()),
            after: Some(after.clone()),
        }
    }
}

/// Compute the structural difference between `left` and `right`
///
/// An entry of kind `Added` means the path exists only in `right`;
/// `Removed` only in `left`; `Modified` in both with unequal values.
/// Maps recurse over the sorted union of their keys, lists over the index
/// range of the longer side. Mismatched composite kinds (map vs list, map
/// vs primitive) report a single `Modified` at that path.
#[must_use]
pub fn diff(left: &Value, right: &Value) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    walk(&ValuePath::root(), Some(left), Some(right), &mut entries);
    entries
}

fn walk(path: &ValuePath, left: Option<&Value>, right: Option<&Value>, out: &mut Vec<DiffEntry>) {
    match (left, right) {
        (None, None) => {}
        (None, Some(r)) => out.push(DiffEntry::added(path.clone(), r)),
        (Some(l), None) => out.push(DiffEntry::removed(path.clone(), l)),
        (Some(l), Some(r)) => match (l, r) {
            (Value::Map(lm), Value::Map(rm)) => {
                // Sorted union: BTreeMap keys are already ordered, and the
                // merge of two ordered key streams stays ordered.
                let mut keys: Vec<&String> = lm.keys().chain(rm.keys()).collect();
                keys.sort();
                keys.dedup();
                for key in keys {
                    walk(&path.child(key.clone()), lm.get(key), rm.get(key), out);
                }
            }
            (Value::List(ll), Value::List(rl)) => {
                for i in 0..ll.len().max(rl.len()) {
                    walk(&path.index(i), ll.get(i), rl.get(i), out);
                }
            }
            _ => {
                if l != r {
                    out.push(DiffEntry::modified(path.clone(), l, r));
                }
            }
        },
    }
}

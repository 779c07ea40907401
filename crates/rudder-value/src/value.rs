//! Algebraic state value
//!
//! [`Value`] is the single representation for live state, snapshots,
//! mutation deltas, and policy metadata. The `Map` variant uses a
//! `BTreeMap` so key traversal is always sorted, which the diff engine
//! relies on for deterministic output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved marker string; a key mapped to this value is removed during
/// overlay merge. The leading NUL keeps it out of the space of ordinary
/// operator-supplied strings.
pub(crate) const DELETE_MARKER: &str = "\u{0}rudder::delete";

/// Tagged-union state value
///
/// Serializes as plain JSON (untagged), so `{"x": 1}` round-trips to
/// `Value::Map({"x": Value::Number(1.0)})`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / null
    Null,
    /// Boolean
    Bool(bool),
    /// Numeric (all numbers are f64, as in JSON)
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list, diff-addressed by index
    List(Vec<Value>),
    /// Key-value map with sorted-key traversal
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The delete sentinel: assigning this to a key in an overlay delta
    /// removes the key instead of setting it.
    #[inline]
    #[must_use]
    pub fn delete_marker() -> Self {
        Self::String(DELETE_MARKER.to_string())
    }

    /// Check whether this value is the delete sentinel
    #[inline]
    #[must_use]
    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::String(s) if s == DELETE_MARKER)
    }

    /// Empty map value
    #[inline]
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Check for `Null`
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for `List` and `Map` (values the diff engine recurses into)
    #[inline]
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Borrow as bool
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as f64
    #[inline]
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as list
    #[inline]
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow as map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a top-level map key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Variant name, for error messages
    #[inline]
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Self::List(l)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(l) => Self::List(l.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(m) => {
                Self::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

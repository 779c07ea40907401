//! Path addressing into nested values
//!
//! A [`ValuePath`] names a location inside a value tree: map keys by name,
//! list elements by index. Paths display dot-separated (`server.ports.0`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step into a nested value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// Map key
    Key(String),
    /// List index
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Path into a nested value, root-first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ValuePath(Vec<Segment>);

impl ValuePath {
    /// The root path (empty)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// True when the path has no segments
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Extend with a map key
    #[inline]
    #[must_use]
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Extend with a list index
    #[inline]
    #[must_use]
    pub fn index(&self, i: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(i));
        Self(segments)
    }

    /// Path segments, root-first
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

/// Path parsing errors
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Empty segment (leading, trailing, or doubled dot)
    #[error("empty path segment in '{0}'")]
    EmptySegment(String),
}

impl FromStr for ValuePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(PathError::EmptySegment(s.to_string()));
            }
            match part.parse::<usize>() {
                Ok(i) => segments.push(Segment::Index(i)),
                Err(_) => segments.push(Segment::Key(part.to_string())),
            }
        }
        Ok(Self(segments))
    }
}

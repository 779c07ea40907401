//! Tagged state values for the Rudder control plane
//!
//! Provides:
//! - [`Value`] - algebraic state value (Null|Bool|Number|String|List|Map)
//! - [`ValuePath`] - dot-separated path addressing into nested values
//! - [`merge_overlay`] - shallow key-level overlay with delete sentinel
//! - [`diff`] - structural, path-addressed difference between two values
//!
//! Values are owned trees, so cycles are unrepresentable and deep copy is
//! plain `Clone`.

pub mod diff;
pub mod merge;
pub mod path;
pub mod value;

pub use diff::{diff, DiffEntry, DiffKind};
pub use merge::merge_overlay;
pub use path::{PathError, Segment, ValuePath};
pub use value::Value;

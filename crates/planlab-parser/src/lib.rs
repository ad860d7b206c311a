//! Turns free-text planner output into typed run records.
//!
//! An [`Extractor`] holds an ordered list of [`Pattern`]s and derived-metric
//! functions. Patterns are either scalar (first matching line wins) or
//! accumulating (every matching line appends a sub-record); derived functions
//! run afterwards in registration order. Configurations are plain values, so
//! tests can build exactly the parser they need.

pub mod derived;
pub mod error;
pub mod extract;
pub mod pattern;
pub mod presets;

pub use error::{ParseError, Result};
pub use extract::{Derived, DerivedFn, Extractor};
pub use pattern::{Anchor, Coercion, FieldKind, Pattern};
pub use presets::{combined, preset, PRESET_NAMES};

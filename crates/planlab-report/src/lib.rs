//! Tables and plot data computed from a run record store.
//!
//! Every report validates its algorithm list against the store before
//! computing anything, so a misspelled name fails loudly instead of
//! producing an empty column.

pub mod absolute;
pub mod attributes;
pub mod compare;
pub mod error;
pub mod oracle;
pub mod scatter;
pub mod table;

pub use absolute::{AbsoluteFormat, AbsoluteReport, AttributeTable};
pub use attributes::{default_attributes, geometric_mean, Aggregation, Attribute};
pub use compare::{ComparisonTable, DomainComparisonReport};
pub use error::{ReportError, Result};
pub use oracle::{OracleReport, OracleTable};
pub use scatter::{by_domain, Categorizer, ScatterFormat, ScatterMode, ScatterPoint, ScatterReport};

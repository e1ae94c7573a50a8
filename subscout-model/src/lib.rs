//! Core data model definitions shared across subscout crates.
#![allow(missing_docs)]

pub mod findings;
pub mod ids;
pub mod query;
pub mod scan;
pub mod stats;
pub mod status;
pub mod tool;

pub use findings::{Findings, ToolFailure, ToolResult, ToolSuccess};
pub use ids::{ParseScanIdError, ScanId};
pub use query::{OrderDirection, ScanListQuery, ScanOrderField};
pub use scan::{NewScan, Scan, ScanSummary, whole_seconds_between};
pub use stats::{DomainCount, ScanStats};
pub use status::{ParseStatusError, ScanStatus};
pub use tool::{EnabledTools, ParseToolError, ScanOptions, ToolName};

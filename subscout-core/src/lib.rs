//! Scan orchestration engine.
//!
//! A scan runs every enabled enumeration tool against one domain at the
//! same time. Each tool is a subprocess driven by [`tools::ProcessRunner`];
//! what it finds while running is kept in a [`tracker::PartialResultTracker`]
//! so a timeout or cancellation still yields data. Results are normalised,
//! persisted per tool, summed by [`aggregate`], and the
//! [`orchestration::ScanOrchestrator`] settles the scan in a terminal status.

pub mod aggregate;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod normalize;
pub mod orchestration;
pub mod tools;
pub mod tracker;

pub use config::{OrchestratorConfig, ToolsConfig};
pub use database::{PostgresScanRepository, ScanRepository};
pub use error::{Result, ScanError};
pub use orchestration::{ScanControlError, ScanControlPlane, ScanOrchestrator};
pub use subscout_model as model;
pub use tools::{ProcessRunner, ToolExecutor, ToolInvocation, ToolRun};
pub use tracker::{PartialResultTracker, TrackerKey};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

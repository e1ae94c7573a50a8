//! Running the external enumeration tools.
//!
//! [`ToolExecutor`] is the seam the orchestrator depends on;
//! [`ProcessRunner`] is the implementation that spawns real subprocesses.

pub mod command;
pub mod health;
pub mod parse;
pub mod runner;

pub use command::{OutputStrategy, ToolCommand};
pub use health::{ToolHealth, ToolsHealthReport, probe_tools};
pub use runner::{ProcessRunner, ToolExecutor, ToolInvocation, ToolRun};

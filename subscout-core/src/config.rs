//! Engine settings. Every field has a default so a partial TOML or JSON
//! document is enough.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use subscout_model::{ScanOptions, ToolName};

use crate::error::{Result, ScanError};

pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TOOL_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_LINE_READ_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HARVESTER_SOURCES: &str = "all";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget per tool run.
    pub default_timeout_secs: u64,
    /// Per-tool budget overrides keyed by tool name (`amass`, ...).
    pub tool_timeouts: BTreeMap<String, u64>,
    /// Upper bound on any tool run, including per-scan overrides.
    pub max_timeout_secs: u64,
    /// How long a streaming read waits before checking whether the process
    /// is still alive.
    pub line_read_timeout_secs: u64,
    pub health_check_timeout_secs: u64,
    /// theHarvester `-b` value when the scan does not choose its own.
    pub harvester_sources: String,
    pub tools: ToolsConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            tool_timeouts: BTreeMap::new(),
            max_timeout_secs: DEFAULT_MAX_TOOL_TIMEOUT_SECS,
            line_read_timeout_secs: DEFAULT_LINE_READ_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            harvester_sources: DEFAULT_HARVESTER_SOURCES.to_string(),
            tools: ToolsConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Scan option first, then the per-tool override, then the default,
    /// capped at [`Self::max_run_duration`].
    pub fn timeout_for(&self, tool: ToolName, options: &ScanOptions) -> Duration {
        let secs = options
            .timeout_seconds
            .or_else(|| self.tool_timeouts.get(tool.as_str()).copied())
            .unwrap_or(self.default_timeout_secs);
        Duration::from_secs(secs.max(1)).min(self.max_run_duration())
    }

    /// Longest any single tool may run.
    pub fn max_run_duration(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs.max(1))
    }

    /// Rejects per-scan overrides the engine would not honour.
    pub fn validate_options(&self, options: &ScanOptions) -> Result<()> {
        match options.timeout_seconds {
            Some(0) => Err(ScanError::InvalidOptions(
                "timeout_seconds must be at least 1".to_string(),
            )),
            Some(secs) if secs > self.max_timeout_secs => Err(ScanError::InvalidOptions(
                format!(
                    "timeout_seconds must not exceed {}",
                    self.max_timeout_secs
                ),
            )),
            _ => Ok(()),
        }
    }

    pub fn line_read_timeout(&self) -> Duration {
        Duration::from_secs(self.line_read_timeout_secs.max(1))
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs.max(1))
    }
}

/// How the tool binaries are reached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Program and leading arguments for each tool.
    pub theharvester: Vec<String>,
    pub amass: Vec<String>,
    pub subfinder: Vec<String>,
    /// When set, every tool runs as `docker exec <container> ...`.
    pub container: Option<String>,
    pub docker_bin: String,
    /// Directory the engine reads batch output files from.
    pub output_dir: PathBuf,
    /// Same directory as seen by the tool, if it differs (for example a
    /// volume mounted elsewhere inside the tools container).
    pub tool_output_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            theharvester: vec!["theHarvester".to_string()],
            amass: vec!["amass".to_string()],
            subfinder: vec!["subfinder".to_string()],
            container: None,
            docker_bin: "docker".to_string(),
            output_dir: std::env::temp_dir(),
            tool_output_dir: None,
        }
    }
}

impl ToolsConfig {
    pub fn base_command(&self, tool: ToolName) -> &[String] {
        match tool {
            ToolName::TheHarvester => &self.theharvester,
            ToolName::Amass => &self.amass,
            ToolName::Subfinder => &self.subfinder,
        }
    }

    pub fn tool_output_dir(&self) -> &PathBuf {
        self.tool_output_dir.as_ref().unwrap_or(&self.output_dir)
    }
}

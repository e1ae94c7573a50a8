use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// External enumeration tools the orchestrator knows how to drive.
///
/// Ordering follows [`ToolName::ALL`], which is also the order tools are
/// reported in error messages.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ToolName {
    #[serde(rename = "theharvester")]
    TheHarvester,
    Amass,
    Subfinder,
}

impl ToolName {
    pub const ALL: [ToolName; 3] =
        [ToolName::TheHarvester, ToolName::Amass, ToolName::Subfinder];

    /// Key used in the enabled-tools mapping and as the result column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::TheHarvester => "theharvester",
            ToolName::Amass => "amass",
            ToolName::Subfinder => "subfinder",
        }
    }

    /// Name used in human-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolName::TheHarvester => "theHarvester",
            ToolName::Amass => "amass",
            ToolName::Subfinder => "subfinder",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseToolError(pub String);

impl fmt::Display for ParseToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool: {}", self.0)
    }
}

impl std::error::Error for ParseToolError {}

impl FromStr for ToolName {
    type Err = ParseToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == needle)
            .ok_or_else(|| ParseToolError(s.to_string()))
    }
}

/// Per-scan tool switchboard, persisted verbatim as a JSON object.
///
/// Keys that do not name a known tool are preserved but ignored. A tool
/// missing from the mapping counts as disabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledTools(pub BTreeMap<String, bool>);

impl Default for EnabledTools {
    fn default() -> Self {
        Self(
            ToolName::ALL
                .iter()
                .map(|tool| (tool.as_str().to_string(), true))
                .collect(),
        )
    }
}

impl EnabledTools {
    pub fn none() -> Self {
        Self(BTreeMap::new())
    }

    pub fn only(tools: &[ToolName]) -> Self {
        Self(
            ToolName::ALL
                .iter()
                .map(|tool| (tool.as_str().to_string(), tools.contains(tool)))
                .collect(),
        )
    }

    pub fn is_enabled(&self, tool: ToolName) -> bool {
        self.0.get(tool.as_str()).copied().unwrap_or(false)
    }

    /// Enabled, recognised tools in canonical order.
    pub fn enabled(&self) -> Vec<ToolName> {
        ToolName::ALL
            .into_iter()
            .filter(|tool| self.is_enabled(*tool))
            .collect()
    }
}

/// Free-form per-scan options. The known keys are typed; anything else a
/// client sends is kept so it round-trips through storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// theHarvester data sources (`-b`), comma separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<String>,
    /// Overrides the configured per-tool timeout for this scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

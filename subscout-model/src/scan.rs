use crate::{EnabledTools, ScanId, ScanOptions, ScanStatus, ToolName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Totals across every tool attached to a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_subdomains: usize,
    pub total_emails: usize,
    pub total_hosts: usize,
    pub total_ips: usize,
}

/// Request to create a scan. The record starts out pending.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewScan {
    pub domain: String,
    #[serde(default)]
    pub tools_enabled: EnabledTools,
    #[serde(default)]
    pub scan_options: ScanOptions,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub is_public: bool,
}

/// A scan record.
///
/// Tool results are kept as raw JSON: they are written by independent tasks
/// and read back leniently, so a malformed blob never prevents the rest of
/// the record from loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub domain: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub tool_results: BTreeMap<ToolName, Value>,
    pub summary: Option<ScanSummary>,
    pub tools_enabled: EnabledTools,
    pub scan_options: ScanOptions,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub user_id: Option<i64>,
    pub is_active: bool,
    pub is_public: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    /// Builds the in-memory shape of a freshly inserted record.
    pub fn from_request(
        request: NewScan,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScanId::new(),
            domain: request.domain,
            status: ScanStatus::Pending,
            tool_results: BTreeMap::new(),
            summary: None,
            tools_enabled: request.tools_enabled,
            scan_options: request.scan_options,
            error_message: None,
            started_at: None,
            finished_at: None,
            duration_seconds: None,
            user_id: request.user_id,
            is_active: true,
            is_public: request.is_public,
            updated_by: created_by.clone(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tool_result(&self, tool: ToolName) -> Option<&Value> {
        self.tool_results.get(&tool).filter(|value| !value.is_null())
    }

    pub fn has_results(&self) -> bool {
        self.tool_results
            .values()
            .any(|value| value.as_object().is_some_and(|map| !map.is_empty()))
    }

    /// Percentage of enabled tools whose blob exists and carries no error.
    pub fn success_rate(&self) -> f64 {
        let enabled = self.tools_enabled.enabled();
        if enabled.is_empty() {
            return 0.0;
        }
        let succeeded = enabled
            .iter()
            .filter(|tool| {
                self.tool_result(**tool)
                    .and_then(Value::as_object)
                    .is_some_and(|blob| !blob.contains_key("error"))
            })
            .count();
        succeeded as f64 / enabled.len() as f64 * 100.0
    }

    /// Stored duration, or one derived from the timestamps when both exist.
    pub fn computed_duration(&self) -> Option<i64> {
        self.duration_seconds.or_else(|| {
            Some(whole_seconds_between(self.started_at?, self.finished_at?))
        })
    }
}

/// Elapsed whole seconds, truncated toward zero.
pub fn whole_seconds_between(
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> i64 {
    (finished_at - started_at).num_seconds()
}

//! Response envelopes and the JSON views of a scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subscout_model::{
    EnabledTools, Scan, ScanId, ScanOptions, ScanStatus, ScanSummary, ToolName,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Full scan record as returned to API callers. Each tool's blob sits under
/// its own key, `null` when the tool has not reported.
#[derive(Debug, Clone, Serialize)]
pub struct ScanView {
    pub scan_id: ScanId,
    pub domain: String,
    pub status: ScanStatus,
    pub theharvester: Option<Value>,
    pub amass: Option<Value>,
    pub subfinder: Option<Value>,
    pub summary: Option<ScanSummary>,
    pub total_subdomains: usize,
    pub total_emails: usize,
    pub total_hosts: usize,
    pub total_ips: usize,
    pub success_rate: f64,
    pub tools_enabled: EnabledTools,
    pub scan_options: ScanOptions,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub user_id: Option<i64>,
    pub is_public: bool,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Scan> for ScanView {
    fn from(scan: Scan) -> Self {
        let summary = scan.summary.unwrap_or_default();
        let tool = |name: ToolName| scan.tool_result(name).cloned();
        Self {
            scan_id: scan.id,
            theharvester: tool(ToolName::TheHarvester),
            amass: tool(ToolName::Amass),
            subfinder: tool(ToolName::Subfinder),
            total_subdomains: summary.total_subdomains,
            total_emails: summary.total_emails,
            total_hosts: summary.total_hosts,
            total_ips: summary.total_ips,
            success_rate: scan.success_rate(),
            duration_seconds: scan.computed_duration(),
            summary: scan.summary,
            domain: scan.domain,
            status: scan.status,
            tools_enabled: scan.tools_enabled,
            scan_options: scan.scan_options,
            error_message: scan.error_message,
            started_at: scan.started_at,
            finished_at: scan.finished_at,
            user_id: scan.user_id,
            is_public: scan.is_public,
            is_active: scan.is_active,
            created_by: scan.created_by,
            created_at: scan.created_at,
            updated_by: scan.updated_by,
            updated_at: scan.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStatusView {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub domain: String,
    pub has_results: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
}

impl From<&Scan> for ScanStatusView {
    fn from(scan: &Scan) -> Self {
        Self {
            scan_id: scan.id,
            status: scan.status,
            domain: scan.domain.clone(),
            has_results: scan.has_results(),
            started_at: scan.started_at,
            finished_at: scan.finished_at,
            duration_seconds: scan.computed_duration(),
            error_message: scan.error_message.clone(),
        }
    }
}

/// What a caller sees of a scan that has not finished.
#[derive(Debug, Clone, Serialize)]
pub struct ScanBrief {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub domain: String,
}

/// Results are withheld until the scan is `finished`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScanResultsView {
    Complete(Box<ScanView>),
    Withheld(ScanBrief),
}

impl From<Scan> for ScanResultsView {
    fn from(scan: Scan) -> Self {
        if scan.status == ScanStatus::Finished {
            ScanResultsView::Complete(Box::new(scan.into()))
        } else {
            ScanResultsView::Withheld(ScanBrief {
                scan_id: scan.id,
                status: scan.status,
                domain: scan.domain,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanListView {
    pub scans: Vec<ScanView>,
    pub count: usize,
    pub skip: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanCommandAccepted {
    pub scan_id: ScanId,
    pub status: ScanStatus,
}

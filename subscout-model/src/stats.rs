use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: i64,
}

/// Aggregate view over the active scans, optionally restricted to one user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_scans: i64,
    /// Keyed by status name; statuses with no scans are reported as zero.
    pub status_counts: BTreeMap<String, i64>,
    pub recent_scans_24h: i64,
    pub top_domains: Vec<DomainCount>,
    pub average_duration_seconds: Option<f64>,
}

//! Summary counters across a scan's tool results.

use serde_json::Value;
use subscout_model::{Scan, ScanSummary};

fn list_len(blob: &Value, field: &str) -> usize {
    blob.get(field)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Sums list lengths across blobs. `None`, `null`, non-object blobs and
/// missing or non-list fields all contribute zero.
pub fn aggregate_blobs<'a, I>(blobs: I) -> ScanSummary
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    blobs
        .into_iter()
        .flatten()
        .filter(|blob| blob.is_object())
        .fold(ScanSummary::default(), |mut summary, blob| {
            summary.total_subdomains += list_len(blob, "subdomains");
            summary.total_emails += list_len(blob, "emails");
            summary.total_hosts += list_len(blob, "hosts");
            summary.total_ips += list_len(blob, "ips");
            summary
        })
}

/// Totals over every tool result persisted on `scan`.
pub fn aggregate(scan: &Scan) -> ScanSummary {
    aggregate_blobs(scan.tool_results.values().map(Some))
}

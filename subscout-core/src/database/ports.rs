use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subscout_model::{
    NewScan, Scan, ScanId, ScanListQuery, ScanStats, ScanStatus, ScanSummary,
    ToolName, ToolResult, whole_seconds_between,
};

use crate::error::{Result, ScanError};

/// Durable store for scan records.
///
/// Every per-tool write targets its own column, so tool tasks of one scan
/// can persist concurrently without coordinating. Status changes are
/// validated against the scan state machine at write time.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    async fn create_scan(
        &self,
        request: NewScan,
        created_by: Option<&str>,
    ) -> Result<Scan>;

    /// Returns soft-deleted scans too; callers decide whether to hide them.
    async fn get_scan_by_id(&self, id: ScanId) -> Result<Option<Scan>>;

    /// `Ok(None)` when the scan does not exist,
    /// [`ScanError::InvalidTransition`] when the move is not allowed.
    /// `started_at` is only set the first time a scan enters `Running`;
    /// terminal states stamp `finished_at` and, when the scan had started,
    /// `duration_seconds`.
    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        error_message: Option<&str>,
        updated_by: &str,
    ) -> Result<Option<Scan>>;

    /// Writes one tool's column. Returns false when the scan is gone.
    async fn update_tool_result(
        &self,
        id: ScanId,
        tool: ToolName,
        result: &ToolResult,
        updated_by: &str,
    ) -> Result<bool>;

    async fn update_scan_summary(
        &self,
        id: ScanId,
        summary: &ScanSummary,
        updated_by: &str,
    ) -> Result<bool>;

    /// Active scans only.
    async fn list_scans(&self, query: &ScanListQuery) -> Result<Vec<Scan>>;

    async fn soft_delete_scan(&self, id: ScanId, deleted_by: &str) -> Result<bool>;

    /// Irreversible.
    async fn hard_delete_scan(&self, id: ScanId) -> Result<bool>;

    async fn scan_stats(&self, user_id: Option<i64>) -> Result<ScanStats>;

    async fn list_running_scans(&self) -> Result<Vec<Scan>>;

    /// Running scans started before `older_than` and pending scans created
    /// before it.
    async fn list_stale_scans(&self, older_than: DateTime<Utc>) -> Result<Vec<Scan>>;

    async fn count_scans_by_domain(&self, domain: &str) -> Result<i64>;
}

/// Statuses from which `target` may be entered.
pub fn allowed_predecessors(target: ScanStatus) -> Vec<ScanStatus> {
    ScanStatus::ALL
        .into_iter()
        .filter(|from| from.can_transition_to(target))
        .collect()
}

/// Applies a status change to an in-memory record with the same rules the
/// SQL adapter enforces.
pub fn apply_status_change(
    scan: &mut Scan,
    status: ScanStatus,
    error_message: Option<&str>,
    updated_by: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if !scan.status.can_transition_to(status) {
        return Err(ScanError::InvalidTransition {
            from: scan.status,
            to: status,
        });
    }

    scan.status = status;
    if let Some(message) = error_message {
        scan.error_message = Some(message.to_string());
    }
    if status == ScanStatus::Running && scan.started_at.is_none() {
        scan.started_at = Some(now);
    }
    if status.is_terminal() {
        scan.finished_at = Some(now);
        scan.duration_seconds = scan
            .started_at
            .map(|started_at| whole_seconds_between(started_at, now));
    }
    scan.updated_by = Some(updated_by.to_string());
    scan.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending() -> Scan {
        Scan::from_request(
            NewScan {
                domain: "example.com".into(),
                ..Default::default()
            },
            Some("tester".into()),
            Utc::now(),
        )
    }

    #[test]
    fn started_at_is_set_once() {
        let mut scan = pending();
        let first = Utc::now();
        apply_status_change(&mut scan, ScanStatus::Running, None, "t", first).unwrap();
        apply_status_change(
            &mut scan,
            ScanStatus::Running,
            None,
            "t",
            first + Duration::seconds(30),
        )
        .unwrap();
        assert_eq!(scan.started_at, Some(first));
    }

    #[test]
    fn terminal_stamps_duration() {
        let mut scan = pending();
        let start = Utc::now();
        apply_status_change(&mut scan, ScanStatus::Running, None, "t", start).unwrap();
        apply_status_change(
            &mut scan,
            ScanStatus::Finished,
            None,
            "t",
            start + Duration::milliseconds(7_400),
        )
        .unwrap();
        assert_eq!(scan.duration_seconds, Some(7));
        assert!(scan.finished_at.is_some());
    }

    #[test]
    fn pending_to_error_has_no_duration() {
        let mut scan = pending();
        apply_status_change(
            &mut scan,
            ScanStatus::Error,
            Some("No tools enabled for this scan."),
            "t",
            Utc::now(),
        )
        .unwrap();
        assert!(scan.started_at.is_none());
        assert!(scan.finished_at.is_some());
        assert!(scan.duration_seconds.is_none());
    }

    #[test]
    fn terminal_states_reject_changes() {
        let mut scan = pending();
        apply_status_change(&mut scan, ScanStatus::Cancelled, None, "t", Utc::now())
            .unwrap();
        let err =
            apply_status_change(&mut scan, ScanStatus::Running, None, "t", Utc::now())
                .unwrap_err();
        assert!(matches!(err, ScanError::InvalidTransition { .. }));
        assert_eq!(scan.status, ScanStatus::Cancelled);
    }

    #[test]
    fn predecessors_follow_transition_table() {
        assert_eq!(
            allowed_predecessors(ScanStatus::Finished),
            vec![ScanStatus::Running]
        );
        assert_eq!(
            allowed_predecessors(ScanStatus::Running),
            vec![ScanStatus::Pending, ScanStatus::Running]
        );
        assert!(allowed_predecessors(ScanStatus::Pending).is_empty());
    }
}

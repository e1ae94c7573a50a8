use chrono::{DateTime, Utc};
use tracing::{info, warn};

use subscout_model::ScanStatus;

use crate::{database::ScanRepository, error::Result};

use super::orchestrator::SYSTEM_ACTOR;

pub const INTERRUPTED_MESSAGE: &str = "Scan interrupted before completion.";

/// Marks scans left `Pending` or `Running` by a previous process as
/// `Error`. Nothing is re-run. Returns how many scans were corrected.
pub async fn reconcile_stale_scans(
    repository: &dyn ScanRepository,
    older_than: DateTime<Utc>,
) -> Result<usize> {
    let stale = repository.list_stale_scans(older_than).await?;
    let mut corrected = 0;

    for scan in stale {
        match repository
            .update_scan_status(
                scan.id,
                ScanStatus::Error,
                Some(INTERRUPTED_MESSAGE),
                SYSTEM_ACTOR,
            )
            .await
        {
            Ok(Some(_)) => corrected += 1,
            Ok(None) => {}
            Err(e) => warn!(scan_id = %scan.id, "Could not mark stale scan: {}", e),
        }
    }

    if corrected > 0 {
        info!("Marked {} stale scan(s) as interrupted", corrected);
    }
    Ok(corrected)
}

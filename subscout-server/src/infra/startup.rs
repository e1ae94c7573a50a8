use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use subscout_core::{
    PartialResultTracker, ProcessRunner, ScanControlPlane, ScanOrchestrator,
    ScanRepository, ToolExecutor, orchestration::reconcile_stale_scans,
};
use tracing::info;

use crate::infra::{app_state::AppState, config::Config};

/// Executor that shells out to the configured tool binaries.
pub fn process_executor(config: &Config) -> Arc<dyn ToolExecutor> {
    Arc::new(ProcessRunner::new(
        Arc::new(config.orchestrator.clone()),
        Arc::new(PartialResultTracker::new()),
    ))
}

pub fn build_app_state(
    repository: Arc<dyn ScanRepository>,
    executor: Arc<dyn ToolExecutor>,
    config: Arc<Config>,
) -> AppState {
    let orchestrator = ScanOrchestrator::new(
        Arc::clone(&repository),
        executor,
        Arc::new(config.orchestrator.clone()),
    );
    let scan_control = Arc::new(ScanControlPlane::new(orchestrator));
    AppState::new(repository, scan_control, config)
}

/// Grace, in minutes, added on top of the longest tool run before a scan
/// counts as abandoned.
const RECONCILE_SLACK_MINUTES: i64 = 1;

/// Age after which an unsettled scan is considered abandoned. Never shorter
/// than the longest run a live instance may still be performing.
pub fn stale_scan_age(config: &Config) -> Duration {
    let minutes = i64::try_from(config.stale_scan_minutes).unwrap_or(i64::MAX);
    let configured = Duration::try_minutes(minutes).unwrap_or(Duration::MAX);
    let longest_run = Duration::from_std(config.orchestrator.max_run_duration())
        .ok()
        .and_then(|run| run.checked_add(&Duration::minutes(RECONCILE_SLACK_MINUTES)))
        .unwrap_or(Duration::MAX);
    configured.max(longest_run)
}

/// Settles scans a previous process left behind. Nothing is re-run.
pub async fn reconcile_interrupted_scans(state: &AppState) -> anyhow::Result<usize> {
    let cutoff = Utc::now()
        .checked_sub_signed(stale_scan_age(state.config()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let corrected = reconcile_stale_scans(state.repository().as_ref(), cutoff)
        .await
        .context("failed to reconcile stale scans")?;
    if corrected == 0 {
        info!("No interrupted scans to reconcile");
    }
    Ok(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_age_covers_the_longest_run() {
        let mut config = Config::default();
        config.stale_scan_minutes = 10;
        config.orchestrator.max_timeout_secs = 3600;
        assert_eq!(stale_scan_age(&config), Duration::minutes(61));

        config.stale_scan_minutes = 120;
        assert_eq!(stale_scan_age(&config), Duration::minutes(120));

        config.stale_scan_minutes = u64::MAX;
        assert_eq!(stale_scan_age(&config), Duration::MAX);
    }
}

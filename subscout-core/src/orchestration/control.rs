use std::{collections::HashMap, fmt, sync::Arc};

use subscout_model::{ScanId, ScanStatus};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use super::orchestrator::ScanOrchestrator;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanControlError {
    #[error("scan_already_running")]
    AlreadyRunning,
    #[error("scan_not_running")]
    ScanNotRunning,
    #[error("shutting_down")]
    ShuttingDown,
}

/// Registry of scans running in this process.
///
/// Every scan gets a child of the plane's shutdown token, so cancelling one
/// scan or shutting the whole plane down goes through the same path: the
/// tool processes are killed and the scan settles as `Cancelled`.
pub struct ScanControlPlane {
    orchestrator: ScanOrchestrator,
    active: Arc<RwLock<HashMap<ScanId, CancellationToken>>>,
    tasks: TaskTracker,
    shutdown_token: CancellationToken,
}

impl fmt::Debug for ScanControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanControlPlane")
            .field("running_tasks", &self.tasks.len())
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl ScanControlPlane {
    pub fn new(orchestrator: ScanOrchestrator) -> Self {
        Self {
            orchestrator,
            active: Arc::new(RwLock::new(HashMap::new())),
            tasks: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }

    /// Starts orchestrating `scan_id` in the background.
    pub async fn start(&self, scan_id: ScanId) -> Result<(), ScanControlError> {
        if self.shutdown_token.is_cancelled() {
            return Err(ScanControlError::ShuttingDown);
        }

        let token = self.shutdown_token.child_token();
        {
            let mut active = self.active.write().await;
            if active.contains_key(&scan_id) {
                return Err(ScanControlError::AlreadyRunning);
            }
            active.insert(scan_id, token.clone());
        }

        let orchestrator = self.orchestrator.clone();
        let active = Arc::clone(&self.active);
        self.tasks.spawn(async move {
            let outcome = orchestrator.run_scan(scan_id, token).await;
            active.write().await.remove(&scan_id);
            match outcome {
                Ok(ScanStatus::Finished) => {
                    info!(scan_id = %scan_id, "Scan finalized with status: finished")
                }
                Ok(status) => {
                    warn!(scan_id = %scan_id, "Scan finalized with status: {}", status)
                }
                Err(e) => error!(scan_id = %scan_id, "Scan task failed: {}", e),
            }
        });
        Ok(())
    }

    /// Requests cancellation. The scan settles asynchronously.
    pub async fn cancel(&self, scan_id: ScanId) -> Result<(), ScanControlError> {
        match self.active.read().await.get(&scan_id) {
            Some(token) => {
                info!(scan_id = %scan_id, "Cancelling scan");
                token.cancel();
                Ok(())
            }
            None => Err(ScanControlError::ScanNotRunning),
        }
    }

    pub async fn is_running(&self, scan_id: ScanId) -> bool {
        self.active.read().await.contains_key(&scan_id)
    }

    pub async fn running_scans(&self) -> Vec<ScanId> {
        self.active.read().await.keys().copied().collect()
    }

    /// Waits until every scan started so far has settled, without
    /// cancelling anything.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Cancels every running scan and waits for them to settle.
    pub async fn shutdown(&self) {
        let running = self.active.read().await.len();
        if running > 0 {
            info!("Cancelling {} running scan(s) for shutdown", running);
        }
        self.shutdown_token.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

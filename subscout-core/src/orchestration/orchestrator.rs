use std::{fmt, sync::Arc};

use serde_json::Value;
use subscout_model::{Scan, ScanId, ScanStatus, ToolName};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    aggregate::aggregate,
    config::OrchestratorConfig,
    database::ScanRepository,
    error::{Result, ScanError},
    tools::{ToolExecutor, ToolInvocation},
    tracker::TrackerKey,
};

/// Audit name for writes made by the orchestrator itself.
pub const SYSTEM_ACTOR: &str = "system_scanner";
pub const NO_TOOLS_MESSAGE: &str = "No tools enabled for this scan.";
pub const TOOLS_FAILED_PREFIX: &str = "Some tools failed: ";
pub const CRITICAL_ERROR_PREFIX: &str = "Critical error during scan orchestration: ";

fn tool_actor(tool: ToolName) -> String {
    format!("system_{}_runner", tool.as_str())
}

/// Drives one scan from `Pending` to a terminal status.
///
/// Each enabled tool runs in its own task and persists its own result
/// column as soon as it settles. Finalisation waits for every task, then
/// re-reads the record so it sees all of those writes.
#[derive(Clone)]
pub struct ScanOrchestrator {
    repository: Arc<dyn ScanRepository>,
    executor: Arc<dyn ToolExecutor>,
    config: Arc<OrchestratorConfig>,
}

impl fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("default_timeout_secs", &self.config.default_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ScanOrchestrator {
    pub fn new(
        repository: Arc<dyn ScanRepository>,
        executor: Arc<dyn ToolExecutor>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            repository,
            executor,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ScanRepository> {
        &self.repository
    }

    /// Runs the scan and returns the status it settled in.
    ///
    /// Tool failures never surface here; they end up in the tool's result
    /// and in the final status. An `Err` means orchestration itself broke,
    /// in which case the scan has already been marked `Error` if it still
    /// exists.
    #[instrument(skip(self, cancel), fields(scan_id = %scan_id))]
    pub async fn run_scan(
        &self,
        scan_id: ScanId,
        cancel: CancellationToken,
    ) -> Result<ScanStatus> {
        let Some(scan) = self.repository.get_scan_by_id(scan_id).await? else {
            error!("Scan {} not found for background task", scan_id);
            return Err(ScanError::NotFound(scan_id.to_string()));
        };

        match self.execute(scan, &cancel).await {
            Ok(status) => Ok(status),
            Err(e) => {
                let message = match &e {
                    ScanError::Disappeared => e.to_string(),
                    other => format!("{CRITICAL_ERROR_PREFIX}{other}"),
                };
                error!("Scan orchestration failed: {}", message);
                match self
                    .repository
                    .update_scan_status(
                        scan_id,
                        ScanStatus::Error,
                        Some(&message),
                        SYSTEM_ACTOR,
                    )
                    .await
                {
                    Ok(Some(_)) => {}
                    Ok(None) => warn!("Scan vanished before the failure could be recorded"),
                    Err(write_err) => {
                        error!("Failed to record orchestration failure: {}", write_err)
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, scan: Scan, cancel: &CancellationToken) -> Result<ScanStatus> {
        let scan_id = scan.id;

        if scan.status.is_terminal() {
            warn!(status = %scan.status, "Scan already settled, nothing to run");
            return Ok(scan.status);
        }

        let tools = scan.tools_enabled.enabled();
        if tools.is_empty() {
            warn!("No tools enabled, failing scan without running it");
            return self
                .settle(scan_id, ScanStatus::Error, Some(NO_TOOLS_MESSAGE))
                .await;
        }

        if cancel.is_cancelled() {
            info!("Scan cancelled before it started");
            return self.settle(scan_id, ScanStatus::Cancelled, None).await;
        }

        if self
            .repository
            .update_scan_status(scan_id, ScanStatus::Running, None, SYSTEM_ACTOR)
            .await?
            .is_none()
        {
            return Err(ScanError::Disappeared);
        }
        info!(domain = %scan.domain, ?tools, "Scan running");

        let mut tasks = JoinSet::new();
        for tool in tools.iter().copied() {
            let invocation = ToolInvocation {
                tool,
                domain: scan.domain.clone(),
                key: TrackerKey::for_scan(scan_id, tool),
                timeout: self.config.timeout_for(tool, &scan.scan_options),
                options: scan.scan_options.clone(),
            };
            let executor = Arc::clone(&self.executor);
            let repository = Arc::clone(&self.repository);
            let token = cancel.child_token();

            tasks.spawn(async move {
                let run = executor.run(invocation, token).await;
                if let Some(error) = &run.error {
                    warn!(tool = %tool, "{} failed: {}", tool, error);
                }
                let result = run.into_result();
                match repository
                    .update_tool_result(scan_id, tool, &result, &tool_actor(tool))
                    .await
                {
                    Ok(true) => debug!(tool = %tool, "Stored {} result", tool),
                    Ok(false) => warn!(tool = %tool, "Scan gone, {} result dropped", tool),
                    Err(e) => error!(tool = %tool, "Failed to store {} result: {}", tool, e),
                }
                tool
            }
            .in_current_span());
        }

        // A panicking tool task must not take the others with it.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Tool task ended abnormally: {}", e);
            }
        }

        self.finalize(scan_id, &tools, cancel).await
    }

    async fn finalize(
        &self,
        scan_id: ScanId,
        tools: &[ToolName],
        cancel: &CancellationToken,
    ) -> Result<ScanStatus> {
        let latest = self
            .repository
            .get_scan_by_id(scan_id)
            .await?
            .ok_or(ScanError::Disappeared)?;

        let summary = aggregate(&latest);
        self.repository
            .update_scan_summary(scan_id, &summary, SYSTEM_ACTOR)
            .await?;

        // A cancel that lands after every tool already completed changes
        // nothing about the results, so the scan settles normally.
        if cancel.is_cancelled() && was_interrupted(&latest, tools) {
            warn!("Scan was cancelled");
            return self.settle(scan_id, ScanStatus::Cancelled, None).await;
        }

        let failures = tool_failures(&latest, tools);
        if failures.is_empty() {
            info!(
                subdomains = summary.total_subdomains,
                emails = summary.total_emails,
                "Scan finished"
            );
            self.settle(scan_id, ScanStatus::Finished, None).await
        } else {
            let message = format!("{TOOLS_FAILED_PREFIX}{}", failures.join("; "));
            warn!("{}", message);
            self.settle(scan_id, ScanStatus::Error, Some(&message)).await
        }
    }

    async fn settle(
        &self,
        scan_id: ScanId,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<ScanStatus> {
        self.repository
            .update_scan_status(scan_id, status, error_message, SYSTEM_ACTOR)
            .await?
            .map(|scan| scan.status)
            .ok_or(ScanError::Disappeared)
    }
}

/// Whether any enabled tool was stopped early or never recorded a result.
fn was_interrupted(scan: &Scan, tools: &[ToolName]) -> bool {
    tools.iter().any(|tool| match scan.tool_result(*tool) {
        None => true,
        Some(blob) => blob.get("partial").and_then(Value::as_bool) == Some(true),
    })
}

/// `"<tool>: <error>"` for every enabled tool whose result carries an error
/// or was never written.
fn tool_failures(scan: &Scan, tools: &[ToolName]) -> Vec<String> {
    tools
        .iter()
        .filter_map(|tool| {
            let reason = match scan.tool_result(*tool) {
                None => "no result recorded".to_string(),
                Some(blob) => match blob.get("error") {
                    None | Some(Value::Null) => return None,
                    Some(Value::String(error)) => error.clone(),
                    Some(other) => other.to_string(),
                },
            };
            Some(format!("{tool}: {reason}"))
        })
        .collect()
}

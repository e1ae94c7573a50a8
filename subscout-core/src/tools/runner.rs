use std::{
    fmt,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subscout_model::{Findings, ScanOptions, ToolFailure, ToolName, ToolResult};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
    sync::RwLock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::OrchestratorConfig,
    normalize::normalize_findings,
    tracker::{PartialResultTracker, TrackerKey},
};

use super::{
    command::{OutputStrategy, ToolCommand},
    parse::{parse_harvester_report, parse_stream_line},
};

/// Stderr kept for error messages is capped so a chatty tool cannot grow it
/// without bound.
const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;
const STDERR_LINES_IN_ERROR: usize = 10;

/// One request to run one tool against one domain.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub tool: ToolName,
    pub domain: String,
    pub key: TrackerKey,
    pub timeout: Duration,
    pub options: ScanOptions,
}

/// Uniform outcome of a tool run, whatever went wrong.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolRun {
    pub tool: ToolName,
    pub success: bool,
    pub findings: Findings,
    pub error: Option<String>,
    pub timeout: bool,
    pub partial: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ToolRun {
    pub fn succeeded(
        tool: ToolName,
        findings: Findings,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            tool,
            success: true,
            findings,
            error: None,
            timeout: false,
            partial: false,
            start_time,
            end_time,
        }
    }

    pub fn failed(
        tool: ToolName,
        error: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            tool,
            success: false,
            findings: Findings::default(),
            error: Some(error.into()),
            timeout: false,
            partial: false,
            start_time,
            end_time,
        }
    }

    /// A run stopped before completion, carrying what was salvaged.
    pub fn interrupted(
        tool: ToolName,
        error: impl Into<String>,
        findings: Findings,
        timeout: bool,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            tool,
            success: false,
            findings,
            error: Some(error.into()),
            timeout,
            partial: true,
            start_time,
            end_time,
        }
    }

    /// Persisted shape, with every list deduplicated.
    pub fn into_result(self) -> ToolResult {
        let findings = normalize_findings(self.findings);
        match self.error {
            None => ToolResult::completed(findings, self.start_time, self.end_time),
            Some(error) => {
                let count = (!findings.is_empty()).then(|| findings.count());
                ToolResult::Failed(ToolFailure {
                    error,
                    subdomains: findings.subdomains,
                    emails: findings.emails,
                    hosts: findings.hosts,
                    ips: findings.ips,
                    count,
                    start_time: self.start_time,
                    end_time: self.end_time,
                    timeout: self.timeout,
                    partial: self.partial,
                })
            }
        }
    }
}

/// Runs a tool to completion. Implementations never fail: every problem is
/// folded into the returned [`ToolRun`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn run(
        &self,
        invocation: ToolInvocation,
        cancel: CancellationToken,
    ) -> ToolRun;
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// [`ToolExecutor`] backed by real subprocesses.
#[derive(Clone)]
pub struct ProcessRunner {
    config: Arc<OrchestratorConfig>,
    tracker: Arc<PartialResultTracker>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("container", &self.config.tools.container)
            .field("tracker", &self.tracker)
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for ProcessRunner {
    async fn run(
        &self,
        invocation: ToolInvocation,
        cancel: CancellationToken,
    ) -> ToolRun {
        let start_time = Utc::now();
        self.tracker.init(invocation.key);

        let run = match ToolCommand::build(
            invocation.tool,
            &invocation.domain,
            &invocation.key,
            &invocation.options,
            &self.config,
        ) {
            Ok(command) => {
                let run = self
                    .execute(&command, &invocation, &cancel, start_time)
                    .await;
                if let OutputStrategy::Batch { output_file } = &command.strategy {
                    remove_output_file(output_file).await;
                }
                run
            }
            Err(e) => {
                error!(tool = %invocation.tool, "Failed to build command: {}", e);
                ToolRun::failed(invocation.tool, e.to_string(), start_time, Utc::now())
            }
        };

        self.tracker.clear(&invocation.key);
        run
    }
}

impl ProcessRunner {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        tracker: Arc<PartialResultTracker>,
    ) -> Self {
        Self { config, tracker }
    }

    async fn execute(
        &self,
        command: &ToolCommand,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
        start_time: DateTime<Utc>,
    ) -> ToolRun {
        let tool = invocation.tool;
        info!(
            tool = %tool,
            domain = %invocation.domain,
            timeout_secs = invocation.timeout.as_secs(),
            "Starting {}",
            command.display()
        );

        let mut child = match Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(tool = %tool, "Failed to spawn {}: {}", command.program, e);
                return ToolRun::failed(
                    tool,
                    format!("Failed to start {tool}: {e}"),
                    start_time,
                    Utc::now(),
                );
            }
        };

        // Collect stderr for error reporting
        let error_output = Arc::new(RwLock::new(String::new()));
        let stderr_handle = child.stderr.take().map(|stderr| {
            let error_output = Arc::clone(&error_output);
            tokio::spawn(async move {
                let mut segments = BufReader::new(stderr).split(b'\n');
                while let Ok(Some(segment)) = segments.next_segment().await {
                    let mut output = error_output.write().await;
                    if output.len() < STDERR_CAPTURE_LIMIT {
                        output.push_str(String::from_utf8_lossy(&segment).trim_end());
                        output.push('\n');
                    }
                }
            })
        });

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill().await;
            return ToolRun::failed(
                tool,
                format!("{tool} stdout was not captured"),
                start_time,
                Utc::now(),
            );
        };

        let stop = tokio::select! {
            _ = cancel.cancelled() => Stop::Cancelled,
            _ = tokio::time::sleep(invocation.timeout) => Stop::TimedOut,
            status = self.drive(&mut child, stdout, command, invocation) => {
                Stop::Exited(status)
            }
        };

        if matches!(stop, Stop::TimedOut | Stop::Cancelled | Stop::Exited(Err(_))) {
            terminate(&mut child, tool).await;
        }
        if let Some(handle) = stderr_handle {
            // Orphaned grandchildren can hold the pipe open; don't wait on them.
            if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
                debug!(tool = %tool, "stderr collector still running, detaching");
            }
        }
        let stderr = error_output.read().await.clone();

        match stop {
            Stop::Cancelled => {
                let findings = self.salvage(command, invocation).await;
                warn!(
                    tool = %tool,
                    salvaged = findings.total(),
                    "{} cancelled, keeping partial results",
                    tool
                );
                ToolRun::interrupted(
                    tool,
                    format!("{tool} cancelled"),
                    findings,
                    false,
                    start_time,
                    Utc::now(),
                )
            }
            Stop::TimedOut => {
                let findings = self.salvage(command, invocation).await;
                warn!(
                    tool = %tool,
                    salvaged = findings.total(),
                    "{} timed out for {}, returning partial results",
                    tool,
                    invocation.domain
                );
                ToolRun::interrupted(
                    tool,
                    format!(
                        "{tool} timed out after {} seconds",
                        invocation.timeout.as_secs()
                    ),
                    findings,
                    true,
                    start_time,
                    Utc::now(),
                )
            }
            Stop::Exited(Err(e)) => {
                let findings = self.salvage(command, invocation).await;
                error!(
                    tool = %tool,
                    salvaged = findings.total(),
                    "I/O error while running {}: {}",
                    tool,
                    e
                );
                ToolRun::interrupted(
                    tool,
                    format!("Exception during {tool} run: {e}"),
                    findings,
                    false,
                    start_time,
                    Utc::now(),
                )
            }
            Stop::Exited(Ok(status)) => {
                self.finish(command, invocation, status, &stderr, start_time)
                    .await
            }
        }
    }

    /// Reads output until the process exits.
    async fn drive(
        &self,
        child: &mut Child,
        stdout: ChildStdout,
        command: &ToolCommand,
        invocation: &ToolInvocation,
    ) -> std::io::Result<ExitStatus> {
        match command.strategy {
            OutputStrategy::Streaming => {
                self.stream_lines(child, stdout, invocation).await
            }
            OutputStrategy::Batch { .. } => {
                let mut stdout = stdout;
                let mut sink = tokio::io::sink();
                let (copied, status) = tokio::join!(
                    tokio::io::copy(&mut stdout, &mut sink),
                    child.wait()
                );
                if let Err(e) = copied {
                    debug!(tool = %invocation.tool, "stdout drain ended: {}", e);
                }
                status
            }
        }
    }

    async fn stream_lines(
        &self,
        child: &mut Child,
        stdout: ChildStdout,
        invocation: &ToolInvocation,
    ) -> std::io::Result<ExitStatus> {
        let line_timeout = self.config.line_read_timeout();
        let mut segments = BufReader::new(stdout).split(b'\n');

        loop {
            match tokio::time::timeout(line_timeout, segments.next_segment()).await {
                Ok(Ok(Some(segment))) => {
                    let Ok(line) = String::from_utf8(segment) else {
                        debug!(tool = %invocation.tool, "Skipping undecodable output line");
                        continue;
                    };
                    let entities =
                        parse_stream_line(invocation.tool, &invocation.domain, &line);
                    let added =
                        self.tracker.update(invocation.key, "subdomains", entities);
                    if added > 0 {
                        debug!(tool = %invocation.tool, "Found {}", line.trim());
                    }
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e),
                // Quiet period: only stop reading if the process is gone.
                Err(_) => {
                    if child.try_wait()?.is_some() {
                        break;
                    }
                }
            }
        }

        child.wait().await
    }

    async fn finish(
        &self,
        command: &ToolCommand,
        invocation: &ToolInvocation,
        status: ExitStatus,
        stderr: &str,
        start_time: DateTime<Utc>,
    ) -> ToolRun {
        let tool = invocation.tool;

        let findings = match &command.strategy {
            OutputStrategy::Streaming => self.tracker.get(&invocation.key),
            OutputStrategy::Batch { output_file } => {
                match tokio::fs::read(output_file).await {
                    Ok(raw) => match parse_harvester_report(&invocation.domain, &raw) {
                        Ok(findings) => findings,
                        Err(e) => {
                            error!(tool = %tool, "Error reading {} output: {}", tool, e);
                            return ToolRun::failed(tool, e, start_time, Utc::now());
                        }
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        warn!(
                            tool = %tool,
                            path = %output_file.display(),
                            "{} wrote no output file",
                            tool
                        );
                        Findings::default()
                    }
                    Err(e) => {
                        error!(tool = %tool, "Error reading {} output: {}", tool, e);
                        return ToolRun::failed(
                            tool,
                            format!("Failed to read {tool} output: {e}"),
                            start_time,
                            Utc::now(),
                        );
                    }
                }
            }
        };

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            if findings.is_empty() {
                error!(
                    tool = %tool,
                    "{} failed with exit code {}: {}",
                    tool,
                    exit_code,
                    stderr
                );
                return ToolRun::failed(
                    tool,
                    format!(
                        "{tool} exited with status {exit_code}: {}",
                        stderr
                            .lines()
                            .take(STDERR_LINES_IN_ERROR)
                            .collect::<Vec<_>>()
                            .join("\n")
                    ),
                    start_time,
                    Utc::now(),
                );
            }
            warn!(
                tool = %tool,
                "{} exited with status {} but produced {} results; keeping them",
                tool,
                exit_code,
                findings.total()
            );
        }

        info!(
            tool = %tool,
            domain = %invocation.domain,
            "{} completed, found {} subdomains",
            tool,
            findings.subdomains.len()
        );
        ToolRun::succeeded(tool, findings, start_time, Utc::now())
    }

    /// Whatever the tracker holds, plus a batch tool's partially written
    /// report if it parses.
    async fn salvage(
        &self,
        command: &ToolCommand,
        invocation: &ToolInvocation,
    ) -> Findings {
        let mut findings = self.tracker.get(&invocation.key);
        if let OutputStrategy::Batch { output_file } = &command.strategy
            && let Ok(raw) = tokio::fs::read(output_file).await
            && let Ok(partial) = parse_harvester_report(&invocation.domain, &raw)
        {
            findings.subdomains.extend(partial.subdomains);
            findings.emails.extend(partial.emails);
            findings.hosts.extend(partial.hosts);
            findings.ips.extend(partial.ips);
        }
        findings
    }
}

/// Kill and reap.
async fn terminate(child: &mut Child, tool: ToolName) {
    if let Err(e) = child.kill().await {
        warn!(tool = %tool, "Failed to kill {}: {}", tool, e);
    }
}

async fn remove_output_file(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

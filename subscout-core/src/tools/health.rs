use std::{collections::BTreeMap, process::Stdio};

use serde::{Deserialize, Serialize};
use subscout_model::ToolName;
use tokio::process::Command;
use tracing::warn;

use crate::config::OrchestratorConfig;

use super::command::ToolCommand;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHealth {
    pub available: bool,
    /// First line of the version output, or why the probe failed.
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsHealthReport {
    /// `healthy` when every tool answered, otherwise `degraded`.
    pub status: String,
    pub tools: BTreeMap<String, ToolHealth>,
}

impl ToolsHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.tools.values().all(|tool| tool.available)
    }
}

/// Asks every tool for its version, concurrently, each bounded by the
/// health-check timeout.
pub async fn probe_tools(config: &OrchestratorConfig) -> ToolsHealthReport {
    let probes = ToolName::ALL.map(|tool| async move { (tool, probe(tool, config).await) });
    let tools: BTreeMap<String, ToolHealth> = futures::future::join_all(probes)
        .await
        .into_iter()
        .map(|(tool, health)| (tool.as_str().to_string(), health))
        .collect();

    let healthy = tools.values().all(|tool| tool.available);
    ToolsHealthReport {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        tools,
    }
}

async fn probe(tool: ToolName, config: &OrchestratorConfig) -> ToolHealth {
    let command = match ToolCommand::version(tool, config) {
        Ok(command) => command,
        Err(e) => {
            return ToolHealth {
                available: false,
                detail: e.to_string(),
            };
        }
    };

    let output = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(config.health_check_timeout(), output).await {
        Ok(Ok(output)) => {
            // Several of these tools print their banner on stderr and some
            // exit non-zero for help output, so any output counts.
            let text = if output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).into_owned()
            } else {
                String::from_utf8_lossy(&output.stdout).into_owned()
            };
            let first_line = text
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default()
                .to_string();
            if output.status.success() || !first_line.is_empty() {
                ToolHealth {
                    available: true,
                    detail: first_line,
                }
            } else {
                ToolHealth {
                    available: false,
                    detail: format!("exited with {}", output.status),
                }
            }
        }
        Ok(Err(e)) => {
            warn!(tool = %tool, "Health probe failed: {}", e);
            ToolHealth {
                available: false,
                detail: e.to_string(),
            }
        }
        Err(_) => ToolHealth {
            available: false,
            detail: format!(
                "no answer within {} seconds",
                config.health_check_timeout().as_secs()
            ),
        },
    }
}

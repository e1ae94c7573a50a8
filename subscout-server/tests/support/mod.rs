#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use subscout_core::{
    ToolExecutor, ToolInvocation, ToolRun, database::InMemoryScanRepository,
};
use subscout_model::{Findings, NewScan, Scan, ScanStatus, ToolName};
use subscout_server::{
    AppState, create_app,
    infra::{config::Config, startup::build_app_state},
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub enum StubOutcome {
    Found(Findings),
    Fails(&'static str),
    /// Runs until cancelled.
    Hangs,
}

/// Tool executor that answers from a fixed table instead of running binaries.
#[derive(Debug, Default)]
pub struct StubExecutor {
    outcomes: HashMap<ToolName, StubOutcome>,
}

impl StubExecutor {
    pub fn with(mut self, tool: ToolName, outcome: StubOutcome) -> Self {
        self.outcomes.insert(tool, outcome);
        self
    }

    pub fn hanging() -> Self {
        ToolName::ALL
            .iter()
            .fold(Self::default(), |stub, tool| stub.with(*tool, StubOutcome::Hangs))
    }
}

#[async_trait]
impl ToolExecutor for StubExecutor {
    async fn run(&self, invocation: ToolInvocation, cancel: CancellationToken) -> ToolRun {
        let tool = invocation.tool;
        let start = Utc::now();
        match self.outcomes.get(&tool).cloned() {
            Some(StubOutcome::Found(findings)) => {
                ToolRun::succeeded(tool, findings, start, Utc::now())
            }
            Some(StubOutcome::Fails(error)) => ToolRun::failed(tool, error, start, Utc::now()),
            Some(StubOutcome::Hangs) => {
                cancel.cancelled().await;
                ToolRun::interrupted(
                    tool,
                    format!("{tool} cancelled"),
                    Findings::default(),
                    false,
                    start,
                    Utc::now(),
                )
            }
            None => ToolRun::succeeded(tool, Findings::default(), start, Utc::now()),
        }
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub repo: Arc<InMemoryScanRepository>,
}

impl TestApp {
    /// Waits for every scan started so far to settle.
    pub async fn settle(&self) {
        self.state.scan_control().wait_idle().await;
    }

    /// Stores a scan directly, bypassing the API and the orchestrator.
    pub async fn seed(&self, domain: &str, status: ScanStatus) -> Scan {
        self.seed_at(domain, status, Utc::now()).await
    }

    pub async fn seed_at(
        &self,
        domain: &str,
        status: ScanStatus,
        created_at: DateTime<Utc>,
    ) -> Scan {
        let mut scan = Scan::from_request(
            NewScan {
                domain: domain.to_string(),
                ..Default::default()
            },
            Some("seed".to_string()),
            created_at,
        );
        scan.status = status;
        self.repo.insert(scan.clone()).await;
        scan
    }
}

pub fn build_test_app(executor: StubExecutor) -> TestApp {
    build_test_app_with_config(executor, Config::default())
}

pub fn build_test_app_with_config(executor: StubExecutor, config: Config) -> TestApp {
    let repo = Arc::new(InMemoryScanRepository::new());
    let state = build_app_state(repo.clone(), Arc::new(executor), Arc::new(config));
    let server = TestServer::new(create_app(state.clone())).expect("test server");
    TestApp {
        server,
        state,
        repo,
    }
}

pub fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

mod support;

use axum::http::StatusCode;
use serde_json::{Value, json};
use subscout_core::ScanRepository;
use subscout_model::{Findings, ScanStatus, ToolName};

use support::{StubExecutor, StubOutcome, build_test_app, names};

const SCANS: &str = "/api/v1/scans";

fn harvester_and_amass() -> StubExecutor {
    StubExecutor::default()
        .with(
            ToolName::TheHarvester,
            StubOutcome::Found(Findings {
                subdomains: names(&["a.example.com", "b.example.com", "c.example.com"]),
                emails: names(&["admin@example.com", "admin@example.com"]),
                ..Default::default()
            }),
        )
        .with(
            ToolName::Amass,
            StubOutcome::Found(Findings {
                subdomains: names(&["d.example.com", "e.example.com"]),
                ..Default::default()
            }),
        )
}

#[tokio::test]
async fn scan_runs_to_completion() {
    let app = build_test_app(harvester_and_amass());

    let response = app
        .server
        .post(SCANS)
        .json(&json!({
            "domain": "https://Example.com/login",
            "tools_enabled": {"theharvester": true, "amass": true, "subfinder": false},
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["domain"], "example.com");
    assert_eq!(body["data"]["created_by"], "api_user");
    let scan_id = body["data"]["scan_id"].as_str().expect("scan id").to_string();

    app.settle().await;

    let status: Value = app
        .server
        .get(&format!("{SCANS}/{scan_id}/status"))
        .await
        .json();
    assert_eq!(status["data"]["status"], "finished");
    assert_eq!(status["data"]["has_results"], true);
    assert!(status["data"]["duration_seconds"].is_i64());

    let results: Value = app
        .server
        .get(&format!("{SCANS}/{scan_id}/results"))
        .await
        .json();
    let data = &results["data"];
    assert_eq!(data["total_subdomains"], 5);
    assert_eq!(data["total_emails"], 1);
    assert_eq!(data["theharvester"]["emails"], json!(["admin@example.com"]));
    assert_eq!(data["amass"]["count"], 2);
    assert!(data["subfinder"].is_null());
    assert_eq!(data["success_rate"], 100.0);
}

#[tokio::test]
async fn failing_tool_marks_scan_as_error() {
    let app = build_test_app(
        harvester_and_amass().with(ToolName::Subfinder, StubOutcome::Fails("rate limited")),
    );

    let body: Value = app
        .server
        .post(SCANS)
        .json(&json!({"domain": "example.com"}))
        .await
        .json();
    let scan_id = body["data"]["scan_id"].as_str().expect("scan id").to_string();
    app.settle().await;

    let scan: Value = app.server.get(&format!("{SCANS}/{scan_id}")).await.json();
    assert_eq!(scan["data"]["status"], "error");
    assert_eq!(
        scan["data"]["error_message"],
        "Some tools failed: subfinder: rate limited"
    );
    assert_eq!(scan["data"]["subfinder"]["error"], "rate limited");

    // Only finished scans expose their results.
    let results: Value = app
        .server
        .get(&format!("{SCANS}/{scan_id}/results"))
        .await
        .json();
    let data = results["data"].as_object().expect("object");
    assert_eq!(data.len(), 3);
    assert_eq!(data["status"], "error");
    assert!(results["message"].is_string());
}

#[tokio::test]
async fn invalid_domain_is_rejected() {
    let app = build_test_app(StubExecutor::default());

    for domain in ["", "not a domain", "localhost", "-bad-.com"] {
        let response = app
            .server
            .post(SCANS)
            .json(&json!({"domain": domain}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["status"], 400, "{domain:?}");
    }

    let listed: Value = app.server.get(SCANS).await.json();
    assert_eq!(listed["data"]["count"], 0);
}

#[tokio::test]
async fn scan_timeout_overrides_are_bounded() {
    let app = build_test_app(harvester_and_amass());
    let cap = app.state.config().orchestrator.max_timeout_secs;

    for timeout in [0, cap + 1] {
        let response = app
            .server
            .post(SCANS)
            .json(&json!({
                "domain": "example.com",
                "scan_options": {"timeout_seconds": timeout},
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(
            body["error"]["message"]
                .as_str()
                .is_some_and(|m| m.contains("timeout_seconds")),
            "{body}"
        );
    }

    app.server
        .post(SCANS)
        .json(&json!({
            "domain": "example.com",
            "scan_options": {"timeout_seconds": cap},
        }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.settle().await;

    let listed: Value = app.server.get(SCANS).await.json();
    assert_eq!(listed["data"]["count"], 1);
}

#[tokio::test]
async fn running_scan_can_be_cancelled_once() {
    let app = build_test_app(StubExecutor::hanging());

    let body: Value = app
        .server
        .post(SCANS)
        .json(&json!({"domain": "example.com"}))
        .await
        .json();
    let scan_id = body["data"]["scan_id"].as_str().expect("scan id").to_string();

    let withheld: Value = app
        .server
        .get(&format!("{SCANS}/{scan_id}/results"))
        .await
        .json();
    assert_eq!(withheld["data"].as_object().expect("object").len(), 3);

    app.server
        .post(&format!("{SCANS}/{scan_id}/cancel"))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.settle().await;

    let status: Value = app
        .server
        .get(&format!("{SCANS}/{scan_id}/status"))
        .await
        .json();
    assert_eq!(status["data"]["status"], "cancelled");
    assert!(status["data"]["finished_at"].is_string());

    let again = app.server.post(&format!("{SCANS}/{scan_id}/cancel")).await;
    again.assert_status(StatusCode::CONFLICT);
    let body: Value = again.json();
    assert_eq!(body["error"]["message"], "scan_not_running");
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let app = build_test_app(StubExecutor::default());

    let missing = subscout_model::ScanId::new();
    for path in [
        format!("{SCANS}/{missing}"),
        format!("{SCANS}/{missing}/status"),
        format!("{SCANS}/{missing}/results"),
    ] {
        app.server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    }
    app.server
        .post(&format!("{SCANS}/{missing}/cancel"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .delete(&format!("{SCANS}/{missing}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .get(&format!("{SCANS}/not-a-uuid"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_scans_disappear_from_the_api() {
    let app = build_test_app(StubExecutor::default());
    let kept = app.seed("kept.com", ScanStatus::Finished).await;
    let gone = app.seed("gone.com", ScanStatus::Finished).await;

    app.server
        .delete(&format!("{SCANS}/{}", gone.id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get(&format!("{SCANS}/{}", gone.id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .delete(&format!("{SCANS}/{}", gone.id))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let listed: Value = app.server.get(SCANS).await.json();
    assert_eq!(listed["data"]["count"], 1);
    assert_eq!(listed["data"]["scans"][0]["scan_id"], kept.id.to_string());

    // The record itself is kept.
    assert!(
        app.repo
            .get_scan_by_id(gone.id)
            .await
            .expect("fetch")
            .is_some_and(|scan| !scan.is_active)
    );
}

#[tokio::test]
async fn listing_filters_and_pages() {
    let app = build_test_app(StubExecutor::default());
    app.seed("alpha.com", ScanStatus::Finished).await;
    app.seed("beta.com", ScanStatus::Running).await;
    app.seed("alphabet.org", ScanStatus::Error).await;

    let by_domain: Value = app
        .server
        .get(SCANS)
        .add_query_param("domain", "ALPHA")
        .add_query_param("order_by", "domain")
        .add_query_param("order_direction", "asc")
        .await
        .json();
    let domains: Vec<&str> = by_domain["data"]["scans"]
        .as_array()
        .expect("scans")
        .iter()
        .filter_map(|scan| scan["domain"].as_str())
        .collect();
    assert_eq!(domains, vec!["alpha.com", "alphabet.org"]);

    let running: Value = app
        .server
        .get(SCANS)
        .add_query_param("status", "running")
        .await
        .json();
    assert_eq!(running["data"]["count"], 1);
    assert_eq!(running["data"]["scans"][0]["domain"], "beta.com");

    let page: Value = app
        .server
        .get(SCANS)
        .add_query_param("skip", 1)
        .add_query_param("limit", 1)
        .add_query_param("order_by", "domain")
        .add_query_param("order_direction", "asc")
        .await
        .json();
    assert_eq!(page["data"]["count"], 1);
    assert_eq!(page["data"]["limit"], 1);
    assert_eq!(page["data"]["scans"][0]["domain"], "alphabet.org");

    app.server
        .get(SCANS)
        .add_query_param("status", "exploded")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summarise_active_scans() {
    let app = build_test_app(StubExecutor::default());
    app.seed("a.com", ScanStatus::Finished).await;
    app.seed("a.com", ScanStatus::Error).await;
    app.seed("b.com", ScanStatus::Finished).await;
    let deleted = app.seed("c.com", ScanStatus::Finished).await;
    app.repo
        .soft_delete_scan(deleted.id, "test")
        .await
        .expect("delete");

    let stats: Value = app
        .server
        .get(&format!("{SCANS}/stats"))
        .await
        .json();
    let data = &stats["data"];
    assert_eq!(data["total_scans"], 3);
    assert_eq!(data["status_counts"]["finished"], 2);
    assert_eq!(data["status_counts"]["error"], 1);
    assert_eq!(data["status_counts"]["running"], 0);
    assert_eq!(data["recent_scans_24h"], 3);
    assert_eq!(data["top_domains"][0], json!({"domain": "a.com", "count": 2}));
}

#[tokio::test]
async fn health_endpoint() {
    let app = build_test_app(StubExecutor::default());
    let body: Value = app.server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");
}

#[cfg(unix)]
mod tool_health {
    use super::*;
    use subscout_server::infra::config::Config;
    use support::build_test_app_with_config;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn all_tools_present() {
        let mut config = Config::default();
        config.orchestrator.tools.theharvester = sh("echo 'theHarvester 4.6.0'");
        config.orchestrator.tools.amass = sh("echo 'v4.2.0'");
        config.orchestrator.tools.subfinder = sh("echo 'Current Version: v2.6.6' >&2");
        let app = build_test_app_with_config(StubExecutor::default(), config);

        let response = app.server.get(&format!("{SCANS}/tools/health")).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tools"]["amass"]["available"], true);
    }

    #[tokio::test]
    async fn missing_tool_degrades() {
        let mut config = Config::default();
        config.orchestrator.tools.theharvester = sh("echo ok");
        config.orchestrator.tools.amass = vec!["/nonexistent/amass".into()];
        config.orchestrator.tools.subfinder = sh("echo ok");
        let app = build_test_app_with_config(StubExecutor::default(), config);

        let response = app.server.get(&format!("{SCANS}/tools/health")).await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["tools"]["amass"]["available"], false);
        assert_eq!(body["tools"]["subfinder"]["available"], true);
    }
}

//! PostgreSQL adapter round trips. Needs `DATABASE_URL` pointing at a
//! server where `sqlx::test` may create throwaway databases.
#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use sqlx::PgPool;
use subscout_core::{
    PostgresScanRepository, ScanError, ScanRepository,
    orchestration::{INTERRUPTED_MESSAGE, reconcile_stale_scans},
};
use subscout_model::{
    EnabledTools, Findings, NewScan, OrderDirection, ScanListQuery,
    ScanOrderField, ScanStatus, ScanSummary, ToolName, ToolResult,
};

fn request(domain: &str) -> NewScan {
    NewScan {
        domain: domain.to_string(),
        tools_enabled: EnabledTools::only(&[ToolName::TheHarvester, ToolName::Amass]),
        user_id: Some(7),
        ..Default::default()
    }
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn create_and_fetch_roundtrip(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let created = repo
        .create_scan(request("example.com"), Some("api_user"))
        .await
        .expect("create");

    let fetched = repo
        .get_scan_by_id(created.id)
        .await
        .expect("fetch")
        .expect("scan exists");

    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.domain, "example.com");
    assert_eq!(fetched.status, ScanStatus::Pending);
    assert_eq!(fetched.created_by.as_deref(), Some("api_user"));
    assert_eq!(fetched.user_id, Some(7));
    assert!(fetched.tools_enabled.is_enabled(ToolName::Amass));
    assert!(!fetched.tools_enabled.is_enabled(ToolName::Subfinder));
    assert!(fetched.tool_results.is_empty());
    assert!(fetched.summary.is_none());
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn lifecycle_stamps_timestamps_and_duration(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let scan = repo
        .create_scan(request("example.com"), None)
        .await
        .expect("create");

    let running = repo
        .update_scan_status(scan.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("running")
        .expect("scan exists");
    let started = running.started_at.expect("started_at");
    assert!(running.finished_at.is_none());

    // A second RUNNING write keeps the original start time.
    let again = repo
        .update_scan_status(scan.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("running again")
        .expect("scan exists");
    assert_eq!(again.started_at, Some(started));

    let done = repo
        .update_scan_status(scan.id, ScanStatus::Finished, None, "system_scanner")
        .await
        .expect("finished")
        .expect("scan exists");
    let finished = done.finished_at.expect("finished_at");
    assert_eq!(
        done.duration_seconds,
        Some((finished - started).num_seconds())
    );
    assert_eq!(done.updated_by.as_deref(), Some("system_scanner"));

    let err = repo
        .update_scan_status(scan.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect_err("terminal scans stay terminal");
    assert!(matches!(err, ScanError::InvalidTransition { .. }));
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn unknown_scan_updates_report_absence(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let id = subscout_model::ScanId::new();

    let status = repo
        .update_scan_status(id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("status update");
    assert!(status.is_none());

    let result = ToolResult::completed(Findings::default(), Utc::now(), Utc::now());
    assert!(
        !repo
            .update_tool_result(id, ToolName::Amass, &result, "system_amass_runner")
            .await
            .expect("tool update")
    );
    assert!(!repo.soft_delete_scan(id, "api_user").await.expect("delete"));
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn tool_results_and_summary_persist(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let scan = repo
        .create_scan(request("example.com"), None)
        .await
        .expect("create");

    let findings = Findings {
        subdomains: vec!["a.example.com".into(), "b.example.com".into()],
        emails: vec!["admin@example.com".into()],
        ..Default::default()
    };
    let result = ToolResult::completed(findings, Utc::now(), Utc::now());
    assert!(
        repo.update_tool_result(
            scan.id,
            ToolName::TheHarvester,
            &result,
            "system_theharvester_runner"
        )
        .await
        .expect("tool result")
    );

    let summary = ScanSummary {
        total_subdomains: 2,
        total_emails: 1,
        total_hosts: 0,
        total_ips: 0,
    };
    assert!(
        repo.update_scan_summary(scan.id, &summary, "system_scanner")
            .await
            .expect("summary")
    );

    let stored = repo
        .get_scan_by_id(scan.id)
        .await
        .expect("fetch")
        .expect("scan exists");
    let blob = stored
        .tool_result(ToolName::TheHarvester)
        .expect("harvester blob");
    assert_eq!(blob["count"], 2);
    assert_eq!(blob["emails"][0], "admin@example.com");
    assert!(stored.tool_result(ToolName::Amass).is_none());
    assert_eq!(stored.summary, Some(summary));
    assert!(stored.has_results());
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn listing_filters_orders_and_hides_deleted(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let a = repo.create_scan(request("alpha.com"), None).await.expect("a");
    let b = repo.create_scan(request("beta.com"), None).await.expect("b");
    let c = repo
        .create_scan(request("alphabet.org"), None)
        .await
        .expect("c");

    repo.update_scan_status(b.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("running");
    assert!(repo.soft_delete_scan(c.id, "api_user").await.expect("delete"));

    let all = repo
        .list_scans(&ScanListQuery {
            order_by: ScanOrderField::Domain,
            order_direction: OrderDirection::Asc,
            ..Default::default()
        })
        .await
        .expect("list");
    assert_eq!(
        all.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![a.id, b.id]
    );

    let alpha = repo
        .list_scans(&ScanListQuery {
            domain: Some("ALPHA".into()),
            ..Default::default()
        })
        .await
        .expect("list by domain");
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].id, a.id);

    let running = repo
        .list_scans(&ScanListQuery {
            status: Some(ScanStatus::Running),
            ..Default::default()
        })
        .await
        .expect("list by status");
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, b.id);

    let paged = repo
        .list_scans(&ScanListQuery {
            skip: 1,
            limit: 1,
            order_by: ScanOrderField::Domain,
            order_direction: OrderDirection::Asc,
            ..Default::default()
        })
        .await
        .expect("page");
    assert_eq!(paged.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b.id]);

    // Soft-deleted records still resolve by id.
    let deleted = repo
        .get_scan_by_id(c.id)
        .await
        .expect("fetch")
        .expect("still stored");
    assert!(!deleted.is_active);
    assert_eq!(repo.count_scans_by_domain("alphabet.org").await.expect("count"), 0);

    assert!(repo.hard_delete_scan(c.id).await.expect("purge"));
    assert!(repo.get_scan_by_id(c.id).await.expect("fetch").is_none());
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn stats_count_statuses_and_domains(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    for domain in ["a.com", "a.com", "b.com"] {
        repo.create_scan(request(domain), None).await.expect("create");
    }
    let done = repo.create_scan(request("a.com"), None).await.expect("create");
    repo.update_scan_status(done.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("running");
    repo.update_scan_status(done.id, ScanStatus::Finished, None, "system_scanner")
        .await
        .expect("finished");

    let stats = repo.scan_stats(None).await.expect("stats");
    assert_eq!(stats.total_scans, 4);
    assert_eq!(stats.status_counts["pending"], 3);
    assert_eq!(stats.status_counts["finished"], 1);
    assert_eq!(stats.status_counts["cancelled"], 0);
    assert_eq!(stats.recent_scans_24h, 4);
    assert_eq!(stats.top_domains[0].domain, "a.com");
    assert_eq!(stats.top_domains[0].count, 3);
    assert!(stats.average_duration_seconds.is_some());

    let other_user = repo.scan_stats(Some(99)).await.expect("stats");
    assert_eq!(other_user.total_scans, 0);
}

#[sqlx::test(migrator = "subscout_core::MIGRATOR")]
async fn stale_scans_are_reconciled(pool: PgPool) {
    let repo = PostgresScanRepository::new(pool);
    let stuck = repo.create_scan(request("example.com"), None).await.expect("create");
    repo.update_scan_status(stuck.id, ScanStatus::Running, None, "system_scanner")
        .await
        .expect("running");
    let settled = repo.create_scan(request("example.com"), None).await.expect("create");
    repo.update_scan_status(settled.id, ScanStatus::Cancelled, None, "system_scanner")
        .await
        .expect("cancelled");

    assert_eq!(repo.list_running_scans().await.expect("running").len(), 1);

    let fixed = reconcile_stale_scans(&repo, Utc::now() + Duration::seconds(1))
        .await
        .expect("reconcile");
    assert_eq!(fixed, 1);

    let stuck = repo
        .get_scan_by_id(stuck.id)
        .await
        .expect("fetch")
        .expect("scan exists");
    assert_eq!(stuck.status, ScanStatus::Error);
    assert_eq!(stuck.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(stuck.finished_at.is_some());
}

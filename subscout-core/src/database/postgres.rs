use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};
use subscout_model::{
    DomainCount, EnabledTools, NewScan, Scan, ScanId, ScanListQuery, ScanOptions,
    ScanStats, ScanStatus, ScanSummary, ToolName, ToolResult,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    database::ports::{ScanRepository, allowed_predecessors},
    error::{Result, ScanError},
};

const SCAN_COLUMNS: &str = r#"
    id, domain, status, theharvester, amass, subfinder, summary,
    tools_enabled, scan_options, error_message,
    started_at, finished_at, duration_seconds,
    user_id, is_active, is_public,
    created_by, created_at, updated_by, updated_at
"#;

const TOP_DOMAINS_LIMIT: i64 = 10;

#[derive(Debug, FromRow)]
struct ScanRow {
    id: Uuid,
    domain: String,
    status: String,
    theharvester: Option<Value>,
    amass: Option<Value>,
    subfinder: Option<Value>,
    summary: Option<Json<ScanSummary>>,
    tools_enabled: Json<EnabledTools>,
    scan_options: Json<ScanOptions>,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    user_id: Option<i64>,
    is_active: bool,
    is_public: bool,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_by: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScanRow> for Scan {
    type Error = ScanError;

    fn try_from(row: ScanRow) -> Result<Self> {
        let status = row.status.parse::<ScanStatus>().map_err(|e| {
            ScanError::Internal(format!("scan {} has {}", row.id, e))
        })?;

        let tool_results: BTreeMap<ToolName, Value> = [
            (ToolName::TheHarvester, row.theharvester),
            (ToolName::Amass, row.amass),
            (ToolName::Subfinder, row.subfinder),
        ]
        .into_iter()
        .filter_map(|(tool, value)| value.map(|value| (tool, value)))
        .collect();

        Ok(Scan {
            id: ScanId(row.id),
            domain: row.domain,
            status,
            tool_results,
            summary: row.summary.map(|Json(summary)| summary),
            tools_enabled: row.tools_enabled.0,
            scan_options: row.scan_options.0,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration_seconds: row.duration_seconds,
            user_id: row.user_id,
            is_active: row.is_active,
            is_public: row.is_public,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        })
    }
}

fn count_to_db(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn status_names(statuses: &[ScanStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(Clone, Debug)]
pub struct PostgresScanRepository {
    pool: PgPool,
}

impl PostgresScanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScanRepository for PostgresScanRepository {
    async fn create_scan(
        &self,
        request: NewScan,
        created_by: Option<&str>,
    ) -> Result<Scan> {
        self.create_scan_internal(request, created_by).await
    }

    async fn get_scan_by_id(&self, id: ScanId) -> Result<Option<Scan>> {
        self.get_scan_by_id_internal(id).await
    }

    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        error_message: Option<&str>,
        updated_by: &str,
    ) -> Result<Option<Scan>> {
        self.update_scan_status_internal(id, status, error_message, updated_by)
            .await
    }

    async fn update_tool_result(
        &self,
        id: ScanId,
        tool: ToolName,
        result: &ToolResult,
        updated_by: &str,
    ) -> Result<bool> {
        self.update_tool_result_internal(id, tool, result, updated_by)
            .await
    }

    async fn update_scan_summary(
        &self,
        id: ScanId,
        summary: &ScanSummary,
        updated_by: &str,
    ) -> Result<bool> {
        self.update_scan_summary_internal(id, summary, updated_by)
            .await
    }

    async fn list_scans(&self, query: &ScanListQuery) -> Result<Vec<Scan>> {
        self.list_scans_internal(query).await
    }

    async fn soft_delete_scan(&self, id: ScanId, deleted_by: &str) -> Result<bool> {
        self.soft_delete_scan_internal(id, deleted_by).await
    }

    async fn hard_delete_scan(&self, id: ScanId) -> Result<bool> {
        self.hard_delete_scan_internal(id).await
    }

    async fn scan_stats(&self, user_id: Option<i64>) -> Result<ScanStats> {
        self.scan_stats_internal(user_id).await
    }

    async fn list_running_scans(&self) -> Result<Vec<Scan>> {
        self.list_running_scans_internal().await
    }

    async fn list_stale_scans(&self, older_than: DateTime<Utc>) -> Result<Vec<Scan>> {
        self.list_stale_scans_internal(older_than).await
    }

    async fn count_scans_by_domain(&self, domain: &str) -> Result<i64> {
        self.count_scans_by_domain_internal(domain).await
    }
}

impl PostgresScanRepository {
    async fn create_scan_internal(
        &self,
        request: NewScan,
        created_by: Option<&str>,
    ) -> Result<Scan> {
        let scan = Scan::from_request(
            request,
            created_by.map(str::to_string),
            Utc::now(),
        );

        let sql = format!(
            r#"
            INSERT INTO scans (
                id, domain, status, tools_enabled, scan_options,
                user_id, is_active, is_public,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8, $9, $8, $9)
            RETURNING {SCAN_COLUMNS}
            "#
        );
        let row: ScanRow = sqlx::query_as(&sql)
            .bind(scan.id.as_uuid())
            .bind(&scan.domain)
            .bind(scan.status.as_str())
            .bind(Json(&scan.tools_enabled))
            .bind(Json(&scan.scan_options))
            .bind(scan.user_id)
            .bind(scan.is_public)
            .bind(&scan.created_by)
            .bind(scan.created_at)
            .fetch_one(self.pool())
            .await?;

        info!(scan_id = %scan.id, domain = %scan.domain, "Created scan");
        row.try_into()
    }

    async fn get_scan_by_id_internal(&self, id: ScanId) -> Result<Option<Scan>> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1");
        let row: Option<ScanRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.map(Scan::try_from).transpose()
    }

    async fn update_scan_status_internal(
        &self,
        id: ScanId,
        status: ScanStatus,
        error_message: Option<&str>,
        updated_by: &str,
    ) -> Result<Option<Scan>> {
        let now = Utc::now();
        let from = status_names(&allowed_predecessors(status));

        // Old column values are visible on the right-hand side of SET, which
        // is what the started_at guard and the duration rely on.
        let sql = format!(
            r#"
            UPDATE scans SET
                status = $2,
                error_message = COALESCE($3, error_message),
                started_at = CASE
                    WHEN $2 = 'running' THEN COALESCE(started_at, $5)
                    ELSE started_at
                END,
                finished_at = CASE WHEN $6 THEN $5 ELSE finished_at END,
                duration_seconds = CASE
                    WHEN $6 AND started_at IS NOT NULL
                        THEN FLOOR(EXTRACT(EPOCH FROM ($5 - started_at)))::BIGINT
                    ELSE duration_seconds
                END,
                updated_by = $4,
                updated_at = $5
            WHERE id = $1 AND status = ANY($7)
            RETURNING {SCAN_COLUMNS}
            "#
        );
        let row: Option<ScanRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(error_message)
            .bind(updated_by)
            .bind(now)
            .bind(status.is_terminal())
            .bind(&from)
            .fetch_optional(self.pool())
            .await?;

        if let Some(row) = row {
            debug!(scan_id = %id, status = %status, "Updated scan status");
            return Scan::try_from(row).map(Some);
        }

        match self.get_scan_by_id_internal(id).await? {
            None => Ok(None),
            Some(current) => Err(ScanError::InvalidTransition {
                from: current.status,
                to: status,
            }),
        }
    }

    async fn update_tool_result_internal(
        &self,
        id: ScanId,
        tool: ToolName,
        result: &ToolResult,
        updated_by: &str,
    ) -> Result<bool> {
        // Column name comes from the closed ToolName set, never from input.
        let sql = format!(
            "UPDATE scans SET {} = $2, updated_by = $3, updated_at = NOW() WHERE id = $1",
            tool.as_str()
        );
        let updated = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(Json(result))
            .bind(updated_by)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn update_scan_summary_internal(
        &self,
        id: ScanId,
        summary: &ScanSummary,
        updated_by: &str,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE scans SET
                summary = $2,
                total_subdomains = $3,
                total_emails = $4,
                total_hosts = $5,
                total_ips = $6,
                updated_by = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(Json(summary))
        .bind(count_to_db(summary.total_subdomains))
        .bind(count_to_db(summary.total_emails))
        .bind(count_to_db(summary.total_hosts))
        .bind(count_to_db(summary.total_ips))
        .bind(updated_by)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn list_scans_internal(&self, query: &ScanListQuery) -> Result<Vec<Scan>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE is_active = TRUE"
        ));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(domain) = query.domain.as_deref().filter(|d| !d.is_empty()) {
            builder
                .push(" AND domain ILIKE ")
                .push_bind(format!("%{}%", escape_like(domain)));
        }
        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(is_public) = query.is_public {
            builder.push(" AND is_public = ").push_bind(is_public);
        }

        builder
            .push(" ORDER BY ")
            .push(query.order_by.column())
            .push(" ")
            .push(query.order_direction.as_sql())
            .push(" NULLS LAST, id ")
            .push(query.order_direction.as_sql())
            .push(" OFFSET ")
            .push_bind(i64::from(query.skip))
            .push(" LIMIT ")
            .push_bind(i64::from(query.effective_limit()));

        let rows: Vec<ScanRow> =
            builder.build_query_as().fetch_all(self.pool()).await?;
        rows.into_iter().map(Scan::try_from).collect()
    }

    async fn soft_delete_scan_internal(
        &self,
        id: ScanId,
        deleted_by: &str,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE scans
            SET is_active = FALSE, updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(id.as_uuid())
        .bind(deleted_by)
        .execute(self.pool())
        .await?
        .rows_affected();

        if updated > 0 {
            info!(scan_id = %id, "Soft deleted scan");
        }
        Ok(updated > 0)
    }

    async fn hard_delete_scan_internal(&self, id: ScanId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM scans WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?
            .rows_affected();

        if deleted > 0 {
            info!(scan_id = %id, "Permanently deleted scan");
        }
        Ok(deleted > 0)
    }

    async fn scan_stats_internal(&self, user_id: Option<i64>) -> Result<ScanStats> {
        let recent_cutoff = Utc::now() - Duration::hours(24);

        let (total_scans, recent_scans_24h, average_duration_seconds): (
            i64,
            i64,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE created_at >= $2),
                AVG(duration_seconds)::FLOAT8
            FROM scans
            WHERE is_active = TRUE AND ($1::BIGINT IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(recent_cutoff)
        .fetch_one(self.pool())
        .await?;

        let status_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM scans
            WHERE is_active = TRUE AND ($1::BIGINT IS NULL OR user_id = $1)
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut status_counts: BTreeMap<String, i64> = ScanStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        status_counts.extend(status_rows);

        let top_domains: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT domain, COUNT(*) AS scans
            FROM scans
            WHERE is_active = TRUE AND ($1::BIGINT IS NULL OR user_id = $1)
            GROUP BY domain
            ORDER BY scans DESC, domain ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(TOP_DOMAINS_LIMIT)
        .fetch_all(self.pool())
        .await?;

        Ok(ScanStats {
            total_scans,
            status_counts,
            recent_scans_24h,
            top_domains: top_domains
                .into_iter()
                .map(|(domain, count)| DomainCount { domain, count })
                .collect(),
            average_duration_seconds,
        })
    }

    async fn list_running_scans_internal(&self) -> Result<Vec<Scan>> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM scans \
             WHERE status = 'running' AND is_active = TRUE \
             ORDER BY started_at ASC NULLS FIRST"
        );
        let rows: Vec<ScanRow> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(Scan::try_from).collect()
    }

    async fn list_stale_scans_internal(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Scan>> {
        let sql = format!(
            r#"
            SELECT {SCAN_COLUMNS} FROM scans
            WHERE (status = 'running' AND COALESCE(started_at, created_at) < $1)
               OR (status = 'pending' AND created_at < $1)
            ORDER BY created_at ASC
            "#
        );
        let rows: Vec<ScanRow> = sqlx::query_as(&sql)
            .bind(older_than)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Scan::try_from).collect()
    }

    async fn count_scans_by_domain_internal(&self, domain: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scans WHERE domain = $1 AND is_active = TRUE",
        )
        .bind(domain)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
    }
}

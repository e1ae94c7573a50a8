//! In-process [`ScanRepository`] used as a test double for the orchestrator
//! and the HTTP layer. It follows the PostgreSQL adapter's semantics but
//! keeps nothing across restarts, so it is not offered as a backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use subscout_model::{
    DomainCount, NewScan, OrderDirection, Scan, ScanId, ScanListQuery,
    ScanOrderField, ScanStats, ScanStatus, ScanSummary, ToolName, ToolResult,
};
use tokio::sync::RwLock;

use crate::{
    database::ports::{ScanRepository, apply_status_change},
    error::{Result, ScanError},
};

#[derive(Debug, Default)]
pub struct InMemoryScanRepository {
    scans: RwLock<HashMap<ScanId, Scan>>,
    fail_writes: AtomicBool,
}

impl InMemoryScanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a database-style error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stores a record as-is, bypassing the state machine.
    pub async fn insert(&self, scan: Scan) {
        self.scans.write().await.insert(scan.id, scan);
    }

    /// Drops a record without a trace, as a concurrent hard delete would.
    pub async fn remove(&self, id: ScanId) -> Option<Scan> {
        self.scans.write().await.remove(&id)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ScanError::Internal("storage unavailable".to_string()));
        }
        Ok(())
    }
}

fn compare(a: &Scan, b: &Scan, field: ScanOrderField) -> std::cmp::Ordering {
    match field {
        ScanOrderField::CreatedAt => a.created_at.cmp(&b.created_at),
        ScanOrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        ScanOrderField::StartedAt => a.started_at.cmp(&b.started_at),
        ScanOrderField::FinishedAt => a.finished_at.cmp(&b.finished_at),
        ScanOrderField::Domain => a.domain.cmp(&b.domain),
        ScanOrderField::Status => a.status.as_str().cmp(b.status.as_str()),
        ScanOrderField::DurationSeconds => {
            a.duration_seconds.cmp(&b.duration_seconds)
        }
        ScanOrderField::TotalSubdomains => {
            let total = |scan: &Scan| scan.summary.map_or(0, |s| s.total_subdomains);
            total(a).cmp(&total(b))
        }
    }
}

#[async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn create_scan(
        &self,
        request: NewScan,
        created_by: Option<&str>,
    ) -> Result<Scan> {
        self.check_writable()?;
        let scan =
            Scan::from_request(request, created_by.map(str::to_string), Utc::now());
        self.scans.write().await.insert(scan.id, scan.clone());
        Ok(scan)
    }

    async fn get_scan_by_id(&self, id: ScanId) -> Result<Option<Scan>> {
        Ok(self.scans.read().await.get(&id).cloned())
    }

    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        error_message: Option<&str>,
        updated_by: &str,
    ) -> Result<Option<Scan>> {
        self.check_writable()?;
        let mut scans = self.scans.write().await;
        let Some(scan) = scans.get_mut(&id) else {
            return Ok(None);
        };
        apply_status_change(scan, status, error_message, updated_by, Utc::now())?;
        Ok(Some(scan.clone()))
    }

    async fn update_tool_result(
        &self,
        id: ScanId,
        tool: ToolName,
        result: &ToolResult,
        updated_by: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let value = serde_json::to_value(result)?;
        let mut scans = self.scans.write().await;
        let Some(scan) = scans.get_mut(&id) else {
            return Ok(false);
        };
        scan.tool_results.insert(tool, value);
        scan.updated_by = Some(updated_by.to_string());
        scan.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_scan_summary(
        &self,
        id: ScanId,
        summary: &ScanSummary,
        updated_by: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut scans = self.scans.write().await;
        let Some(scan) = scans.get_mut(&id) else {
            return Ok(false);
        };
        scan.summary = Some(*summary);
        scan.updated_by = Some(updated_by.to_string());
        scan.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_scans(&self, query: &ScanListQuery) -> Result<Vec<Scan>> {
        let needle = query.domain.as_deref().map(str::to_ascii_lowercase);
        let mut scans: Vec<Scan> = self
            .scans
            .read()
            .await
            .values()
            .filter(|scan| scan.is_active)
            .filter(|scan| query.status.is_none_or(|status| scan.status == status))
            .filter(|scan| {
                needle.as_deref().is_none_or(|needle| {
                    scan.domain.to_ascii_lowercase().contains(needle)
                })
            })
            .filter(|scan| query.user_id.is_none_or(|id| scan.user_id == Some(id)))
            .filter(|scan| query.is_public.is_none_or(|p| scan.is_public == p))
            .cloned()
            .collect();

        scans.sort_by(|a, b| {
            let ordering =
                compare(a, b, query.order_by).then_with(|| a.id.cmp(&b.id));
            match query.order_direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        });

        Ok(scans
            .into_iter()
            .skip(query.skip as usize)
            .take(query.effective_limit() as usize)
            .collect())
    }

    async fn soft_delete_scan(&self, id: ScanId, deleted_by: &str) -> Result<bool> {
        self.check_writable()?;
        let mut scans = self.scans.write().await;
        match scans.get_mut(&id) {
            Some(scan) if scan.is_active => {
                scan.is_active = false;
                scan.updated_by = Some(deleted_by.to_string());
                scan.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete_scan(&self, id: ScanId) -> Result<bool> {
        self.check_writable()?;
        Ok(self.scans.write().await.remove(&id).is_some())
    }

    async fn scan_stats(&self, user_id: Option<i64>) -> Result<ScanStats> {
        let scans = self.scans.read().await;
        let active: Vec<&Scan> = scans
            .values()
            .filter(|scan| scan.is_active)
            .filter(|scan| user_id.is_none_or(|id| scan.user_id == Some(id)))
            .collect();

        let recent_cutoff = Utc::now() - Duration::hours(24);
        let mut status_counts: BTreeMap<String, i64> = ScanStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        let mut per_domain: BTreeMap<&str, i64> = BTreeMap::new();
        let mut durations = Vec::new();

        for scan in &active {
            *status_counts
                .entry(scan.status.as_str().to_string())
                .or_default() += 1;
            *per_domain.entry(scan.domain.as_str()).or_default() += 1;
            durations.extend(scan.duration_seconds);
        }

        let mut top_domains: Vec<DomainCount> = per_domain
            .into_iter()
            .map(|(domain, count)| DomainCount {
                domain: domain.to_string(),
                count,
            })
            .collect();
        // Stable sort keeps the alphabetical order among ties.
        top_domains.sort_by(|a, b| b.count.cmp(&a.count));
        top_domains.truncate(10);

        Ok(ScanStats {
            total_scans: active.len() as i64,
            status_counts,
            recent_scans_24h: active
                .iter()
                .filter(|scan| scan.created_at >= recent_cutoff)
                .count() as i64,
            top_domains,
            average_duration_seconds: (!durations.is_empty()).then(|| {
                durations.iter().sum::<i64>() as f64 / durations.len() as f64
            }),
        })
    }

    async fn list_running_scans(&self) -> Result<Vec<Scan>> {
        Ok(self
            .scans
            .read()
            .await
            .values()
            .filter(|scan| scan.is_active && scan.status == ScanStatus::Running)
            .cloned()
            .collect())
    }

    async fn list_stale_scans(&self, older_than: DateTime<Utc>) -> Result<Vec<Scan>> {
        let mut stale: Vec<Scan> = self
            .scans
            .read()
            .await
            .values()
            .filter(|scan| match scan.status {
                ScanStatus::Running => {
                    scan.started_at.unwrap_or(scan.created_at) < older_than
                }
                ScanStatus::Pending => scan.created_at < older_than,
                _ => false,
            })
            .cloned()
            .collect();
        stale.sort_by_key(|scan| scan.created_at);
        Ok(stale)
    }

    async fn count_scans_by_domain(&self, domain: &str) -> Result<i64> {
        Ok(self
            .scans
            .read()
            .await
            .values()
            .filter(|scan| scan.is_active && scan.domain == domain)
            .count() as i64)
    }
}

use crate::ScanStatus;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Columns a scan listing may be ordered by.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrderField {
    #[default]
    CreatedAt,
    UpdatedAt,
    StartedAt,
    FinishedAt,
    Domain,
    Status,
    DurationSeconds,
    TotalSubdomains,
}

impl ScanOrderField {
    pub fn column(&self) -> &'static str {
        match self {
            ScanOrderField::CreatedAt => "created_at",
            ScanOrderField::UpdatedAt => "updated_at",
            ScanOrderField::StartedAt => "started_at",
            ScanOrderField::FinishedAt => "finished_at",
            ScanOrderField::Domain => "domain",
            ScanOrderField::Status => "status",
            ScanOrderField::DurationSeconds => "duration_seconds",
            ScanOrderField::TotalSubdomains => "total_subdomains",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Filters, pagination and ordering for listing scans. Soft-deleted scans
/// are never listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanListQuery {
    pub skip: u32,
    pub limit: u32,
    pub status: Option<ScanStatus>,
    /// Case-insensitive substring match on the domain.
    pub domain: Option<String>,
    pub user_id: Option<i64>,
    pub is_public: Option<bool>,
    pub order_by: ScanOrderField,
    pub order_direction: OrderDirection,
}

impl Default for ScanListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
            domain: None,
            user_id: None,
            is_public: None,
            order_by: ScanOrderField::default(),
            order_direction: OrderDirection::default(),
        }
    }
}

impl ScanListQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let mut query = ScanListQuery {
            limit: 50_000,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_PAGE_SIZE);
        query.limit = 0;
        assert_eq!(query.effective_limit(), 1);
    }

    #[test]
    fn order_field_from_wire() {
        let field: ScanOrderField =
            serde_json::from_str("\"duration_seconds\"").unwrap();
        assert_eq!(field.column(), "duration_seconds");
        assert!(serde_json::from_str::<ScanOrderField>("\"id; drop\"").is_err());
    }
}

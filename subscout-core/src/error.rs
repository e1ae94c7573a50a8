use subscout_model::ScanStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan not found: {0}")]
    NotFound(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Scan disappeared during execution.")]
    Disappeared,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

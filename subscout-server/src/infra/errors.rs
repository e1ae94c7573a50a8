use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use subscout_core::{ScanControlError, ScanError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NotFound(_) => Self::not_found(err.to_string()),
            ScanError::InvalidDomain(_) | ScanError::InvalidOptions(_) => {
                Self::bad_request(err.to_string())
            }
            ScanError::InvalidTransition { .. } => Self::conflict(err.to_string()),
            ScanError::Database(db) => db.into(),
            other => {
                tracing::error!(error = %other, "scan operation failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<ScanControlError> for AppError {
    fn from(err: ScanControlError) -> Self {
        match err {
            ScanControlError::AlreadyRunning | ScanControlError::ScanNotRunning => {
                Self::conflict(err.to_string())
            }
            ScanControlError::ShuttingDown => Self::service_unavailable(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "database operation failed");
        Self::internal("Database operation failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subscout_model::ScanStatus;

    #[test]
    fn scan_errors_map_to_statuses() {
        let cases = [
            (ScanError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ScanError::InvalidDomain("x".into()), StatusCode::BAD_REQUEST),
            (ScanError::InvalidOptions("x".into()), StatusCode::BAD_REQUEST),
            (
                ScanError::InvalidTransition {
                    from: ScanStatus::Finished,
                    to: ScanStatus::Running,
                },
                StatusCode::CONFLICT,
            ),
            (ScanError::Disappeared, StatusCode::INTERNAL_SERVER_ERROR),
            (ScanError::Database(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn database_details_are_not_leaked() {
        let err = AppError::from(ScanError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.message, "Database operation failed");
    }

    #[test]
    fn control_errors_keep_their_codes() {
        let err = AppError::from(ScanControlError::ScanNotRunning);
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "scan_not_running");
        assert_eq!(
            AppError::from(ScanControlError::ShuttingDown).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

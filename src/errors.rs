use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

/// Errors raised by the collection pipeline and its collaborators.
///
/// The first four variants are the "collector" failure family: the scheduler
/// treats them as recoverable and schedules a retry. Everything else stops it.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Unexpected response from {url}: HTTP {status}: {body}")]
    Response {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response data schema: {0}")]
    Schema(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CollectorError {
    /// Whether the scheduler may retry the pass that produced this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CollectorError::Response { .. }
                | CollectorError::Schema(_)
                | CollectorError::NoData(_)
                | CollectorError::Transport(_)
        )
    }

    /// Whether a coordinate-resolution failure only disqualifies the one city.
    pub fn skips_city(&self) -> bool {
        matches!(
            self,
            CollectorError::NoData(_) | CollectorError::Response { .. }
        )
    }
}

/// Errors returned by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<CollectorError> for AppError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Database(e) => AppError::DatabaseError(e),
            CollectorError::NoData(msg) => AppError::Unavailable(msg),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

use std::fmt;

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return AppError::Unauthenticated;
            }
            return AppError::Server {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return AppError::Unexpected(format!("failed to decode response: {}", err));
        }
        AppError::Network(err.to_string())
    }
}

/// Coarse classification of a sync failure, used to decide how loudly to
/// report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ResolvedError {
    NetworkRelated(String),
    Unauthenticated(String),
    ServerError(String),
    Unexpected(String),
}

impl ResolvedError {
    pub fn resolve(err: &AppError) -> Self {
        let message = err.to_string();
        match err {
            AppError::Network(_) => ResolvedError::NetworkRelated(message),
            AppError::Unauthenticated => ResolvedError::Unauthenticated(message),
            AppError::Server { .. } => ResolvedError::ServerError(message),
            _ => ResolvedError::Unexpected(message),
        }
    }

    /// Server and programmer errors need someone to look at them; network
    /// and auth failures fix themselves on a later cycle.
    pub fn is_reportable(&self) -> bool {
        matches!(self, ResolvedError::ServerError(_) | ResolvedError::Unexpected(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ResolvedError::NetworkRelated(m)
            | ResolvedError::Unauthenticated(m)
            | ResolvedError::ServerError(m)
            | ResolvedError::Unexpected(m) => m,
        }
    }
}

impl fmt::Display for ResolvedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResolvedError::NetworkRelated(_) => "network",
            ResolvedError::Unauthenticated(_) => "unauthenticated",
            ResolvedError::ServerError(_) => "server",
            ResolvedError::Unexpected(_) => "unexpected",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Sync server rejected the access token".to_string(),
            ),
            AppError::Network(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Server { status, body } => (
                StatusCode::BAD_GATEWAY,
                format!("Sync server returned {}: {}", status, body),
            ),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            other => {
                error!("internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}

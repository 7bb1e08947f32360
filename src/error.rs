use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("forbidden")]
    Forbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integration failure: {0}")]
    Integration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation",
            AppError::Forbidden => "forbidden",
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Integration(_) => "integration",
            AppError::Internal(_) | AppError::Config(_) | AppError::Db(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Integration(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IntegrationError> for AppError {
    fn from(err: IntegrationError) -> Self {
        AppError::Integration(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let field = match &self {
            AppError::Validation { field, .. } => Some(*field),
            _ => None,
        };
        // Storage and config details stay in the log.
        let message = match &self {
            AppError::Internal(_) | AppError::Config(_) | AppError::Db(_) => {
                tracing::error!("{self}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "error": self.kind(),
            "field": field,
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

/// Failure talking to an outside collaborator (mail relay, payment gateway).
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("mail: {0}")]
    Mail(String),

    #[error("payment gateway: {0}")]
    Payment(String),

    #[error("template: {0}")]
    Template(#[from] tera::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

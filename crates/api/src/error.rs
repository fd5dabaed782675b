use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use storyboard_core::error::CoreError;
use storyboard_db::StoreError;
use storyboard_llm::AnalysisError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`StoreError`] for persistence and
/// [`AnalysisError`] for story analysis, and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `storyboard_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A project store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Story analysis failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upload larger than the configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A required backend is not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            // --- Store errors ---
            AppError::Store(StoreError::Core(core)) => classify_core_error(core),
            AppError::Store(other) => {
                tracing::error!(error = %other, "Project store error");
                internal()
            }

            // --- Analysis errors ---
            AppError::Analysis(err) => match err {
                AnalysisError::EmptyInput => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                AnalysisError::Provider(e) => {
                    tracing::warn!(error = %e, "Text provider failed");
                    (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", err.to_string())
                }
                AnalysisError::Parse(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "ANALYSIS_PARSE_ERROR",
                    err.to_string(),
                ),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a [`CoreError`] into an HTTP status, error code, and message.
fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unsupported(msg) => (StatusCode::BAD_REQUEST, "UNSUPPORTED", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

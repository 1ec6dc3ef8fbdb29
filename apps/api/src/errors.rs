use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::metering::window::WindowUsage;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Metering denials only become errors here, at the HTTP edge. The limiters themselves
/// report denials as ordinary values.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimited {
        usage: WindowUsage,
        /// Sent as `Retry-After`.
        retry_after_secs: i64,
    },

    #[error("Free allotment exhausted: {message}")]
    QuotaExhausted {
        message: String,
        reset_at: DateTime<Utc>,
        retry_after_secs: i64,
    },

    #[error("No credits remaining")]
    InsufficientCredits,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Analysis service error: {0}")]
    Analysis(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after: Option<i64> = None;

        let (status, code, message, details): (StatusCode, &str, String, Option<Value>) =
            match &self {
                AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
                AppError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                    None,
                ),
                AppError::Unauthorized => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Authentication required".to_string(),
                    None,
                ),
                AppError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Access denied".to_string(),
                    None,
                ),
                AppError::RateLimited {
                    usage,
                    retry_after_secs,
                } => {
                    retry_after = Some(*retry_after_secs);
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        "RATE_LIMITED",
                        format!(
                            "Too many requests. The limit is {} per window, try again later.",
                            usage.limit
                        ),
                        Some(json!({
                            "limit": usage.limit,
                            "remaining": usage.remaining,
                            "reset": usage.reset,
                        })),
                    )
                }
                AppError::QuotaExhausted {
                    message,
                    reset_at,
                    retry_after_secs,
                } => {
                    retry_after = Some(*retry_after_secs);
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        "FREE_QUOTA_EXHAUSTED",
                        message.clone(),
                        Some(json!({
                            "remaining": 0,
                            "reset_at": reset_at,
                        })),
                    )
                }
                AppError::InsufficientCredits => (
                    StatusCode::PAYMENT_REQUIRED,
                    "INSUFFICIENT_CREDITS",
                    "You have no credits remaining".to_string(),
                    Some(json!({ "credits_remaining": 0 })),
                ),
                AppError::Database(e) => {
                    tracing::error!("Database error: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "A database error occurred".to_string(),
                        None,
                    )
                }
                AppError::Analysis(msg) => {
                    tracing::error!("Analysis service error: {msg}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "ANALYSIS_FAILED",
                        "The resume could not be analyzed, please try again".to_string(),
                        None,
                    )
                }
                AppError::Internal(e) => {
                    tracing::error!("Internal error: {e:?}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal server error occurred".to_string(),
                        None,
                    )
                }
            };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

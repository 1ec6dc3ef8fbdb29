//! Axum route handlers for the Resume API.

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::analysis::extract::extract_resume_text;
use crate::analysis::AnalysisRequest;
use crate::clock::Clock;
use crate::errors::AppError;
use crate::metering::gate::CreditReceipt;
use crate::metering::identity::resolve_caller;
use crate::metering::window::RateLimitOutcome;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub file_name: Option<String>,
    pub characters: usize,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: serde_json::Value,
    /// Clients overwrite their local balance with this.
    pub credits: CreditReceipt,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/parse
///
/// Extracts text from an uploaded resume (multipart field `file`).
/// Parsing is free: it never touches credits or the analysis allotment.
pub async fn handle_parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ParseResponse>, AppError> {
    if let Some(limiter) = &state.parse_limiter {
        let caller = resolve_caller(&headers)?;
        let outcome =
            limiter.check_with_info(state.config.parse_limit_per_minute, &caller.token());
        if let RateLimitOutcome::Denied(usage) = outcome {
            return Err(AppError::RateLimited {
                retry_after_secs: state.clock.seconds_until(usage.reset),
                usage,
            });
        }
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;

        let text = extract_resume_text(bytes.to_vec(), content_type.as_deref()).await?;
        return Ok(Json(ParseResponse {
            file_name,
            characters: text.chars().count(),
            text,
        }));
    }

    Err(AppError::Validation(
        "Missing multipart field 'file'".to_string(),
    ))
}

/// POST /api/v1/resumes/analyze
///
/// Admit → analyze → settle. The caller is charged only when the analysis succeeds,
/// but limiter counters taken at admission are kept either way.
pub async fn handle_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    if request.resume_text.trim().is_empty() {
        return Err(AppError::Validation(
            "resume_text cannot be empty".to_string(),
        ));
    }

    let caller = resolve_caller(&headers)?;
    let admission = state.gate.admit(&caller).await?;

    let analysis = state
        .analyzer
        .analyze(&request)
        .await
        .map_err(|e| AppError::Analysis(e.to_string()))?;

    let credits = state.gate.settle(admission).await?;
    info!(
        "Analysis completed for {} caller, {} credits left",
        if caller.is_authenticated() { "signed-in" } else { "anonymous" },
        credits.credits_remaining
    );

    Ok(Json(AnalyzeResponse { analysis, credits }))
}

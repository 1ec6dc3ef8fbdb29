//! Axum route handlers for allowance display and support overrides.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::metering::gate::UsageReport;
use crate::metering::identity::resolve_caller;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// GET /api/v1/usage
///
/// Current allowance for the caller. Never consumes anything.
pub async fn handle_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageReport>, AppError> {
    let caller = resolve_caller(&headers)?;
    let report = state.gate.usage(&caller).await?;
    Ok(Json(report))
}

/// DELETE /api/v1/admin/anonymous-quota/:ip
///
/// Clears the free allotment recorded for one IP.
pub async fn handle_reset_anonymous_quota(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(AppError::Forbidden)?;

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Forbidden);
    }

    state.gate.anonymous_quota().reset(ip.trim());
    Ok(StatusCode::NO_CONTENT)
}

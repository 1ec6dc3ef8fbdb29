pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::analysis::handlers as resumes;
use crate::metering::handlers as metering;
use crate::state::AppState;

/// Uploads are capped at 5 MB in `analysis::extract`; leave room for multipart framing.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Usage API
        .route("/api/v1/usage", get(metering::handle_usage))
        .route(
            "/api/v1/admin/anonymous-quota/:ip",
            delete(metering::handle_reset_anonymous_quota),
        )
        // Resume API
        .route("/api/v1/resumes/parse", post(resumes::handle_parse))
        .route("/api/v1/resumes/analyze", post(resumes::handle_analyze))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

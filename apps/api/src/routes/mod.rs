pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers as pipeline;
use crate::state::AppState;
use crate::upload::handlers as upload;

/// Headroom for multipart framing and other form fields.
const BODY_OVERHEAD: usize = 64 * 1024;

/// The transport limit sits well above the upload policy so oversized files
/// reach the validator and fail with `TOO_LARGE`, not a bare 413.
fn body_limit(max_upload_bytes: u64) -> usize {
    usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX / 2)
        .saturating_mul(2)
        .saturating_add(BODY_OVERHEAD)
}

pub fn build_router(state: AppState) -> Router {
    let limit = body_limit(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/upload", post(upload::handle_upload))
        .route("/analyze", post(pipeline::handle_analyze))
        .route("/score", post(pipeline::handle_score))
        .route("/cleanup", post(pipeline::handle_cleanup))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

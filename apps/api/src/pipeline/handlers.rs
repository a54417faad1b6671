//! Axum route handlers for the scoring pipeline.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::pipeline::PipelineOutcome;
use crate::state::AppState;
use crate::upload::multipart::{or_missing, read_candidate};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub removed: usize,
}

/// POST /analyze
///
/// Scores a CV stored earlier by `POST /upload`. The file must still pass every
/// upload gate; once the run starts it is removed whatever the outcome.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<PipelineOutcome, AppError> {
    let path = state.workspace.resolve(&request.path).await?;
    let file = state.pipeline.stored(path).await?;
    Ok(state.pipeline.run_file(file).await)
}

/// POST /score
///
/// Upload and score in one request.
pub async fn handle_score(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<PipelineOutcome, AppError> {
    let candidate = or_missing(read_candidate(multipart).await?);
    Ok(state.pipeline.run(candidate).await)
}

/// POST /cleanup
///
/// Removes every file left in the output directory.
pub async fn handle_cleanup(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, AppError> {
    let removed = state
        .workspace
        .purge()
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("workspace purge failed")))?;

    Ok(Json(CleanupResponse {
        message: "Cleanup successful".to_string(),
        removed,
    }))
}

use axum::{extract::Multipart, extract::State, Json};
use serde::Serialize;

use crate::errors::AppError;
use crate::state::AppState;
use crate::upload::multipart::{or_missing, read_candidate};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
}

/// POST /upload
///
/// Validates and stores the `cv` field. The returned path is what
/// `POST /analyze` expects.
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    tracing::info!("Processing file upload request");
    let candidate = or_missing(read_candidate(multipart).await?);
    let file = state.pipeline.upload(candidate).await?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        path: file.path.display().to_string(),
    }))
}

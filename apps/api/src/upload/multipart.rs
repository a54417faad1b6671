use axum::extract::Multipart;

use crate::errors::AppError;
use crate::upload::validator::UploadCandidate;

/// Form field that carries the CV.
pub const FILE_FIELD: &str = "cv";

/// Pulls the CV field out of a multipart form.
///
/// Returns `None` when the form has no such field; the presence gate turns
/// that into `MissingFile`. Other fields are drained and ignored.
pub async fn read_candidate(mut multipart: Multipart) -> Result<Option<UploadCandidate>, AppError> {
    let mut candidate = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))?;
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {e}")))?;

        candidate = Some(UploadCandidate::new(filename, content_type, data));
    }

    Ok(candidate)
}

/// An absent field becomes a candidate with no filename, which the first gate rejects.
pub fn or_missing(candidate: Option<UploadCandidate>) -> UploadCandidate {
    candidate.unwrap_or_else(|| UploadCandidate::new(None, None, bytes::Bytes::new()))
}

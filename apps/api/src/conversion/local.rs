use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::conversion::{write_artifact, ConversionError, ConversionOptions, ConversionProvider};

/// In-process extraction with `pdf-extract`. No OCR, so scanned CVs come back
/// empty; the page range is already bounded by the upload page gate.
pub struct LocalPdfConverter;

#[async_trait]
impl ConversionProvider for LocalPdfConverter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError> {
        if options.enable_ocr {
            debug!("OCR requested but unavailable in local backend; extracting embedded text only");
        }

        let pdf = tokio::fs::read(source).await?;
        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
            .await
            .map_err(|e| ConversionError::Internal(format!("pdf-extract panicked: {e}")))?
            .map_err(|e| ConversionError::Provider(e.to_string()))?;

        write_artifact(destination, clean_text(&raw).into_bytes()).await
    }
}

/// Normalises extracted text into prose: unified newlines, no trailing
/// whitespace, at most one blank line in a row.
fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }

    out.trim().to_string()
}

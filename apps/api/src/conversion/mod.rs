//! PDF → plain-text conversion.
//!
//! The gateway owns the request policy and the artifact path; providers only
//! move bytes. Output is tuned for language-model input, not layout fidelity.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::errors::ErrorKind;
use crate::upload::validator::ValidatedFile;
use crate::workspace::Workspace;

pub mod convert_api;
pub mod local;

#[derive(Debug, Error)]
pub enum ConversionError {
    /// The provider rejected or failed the conversion.
    #[error("API error: {0}")]
    Provider(String),

    #[error("Conversion failed: {0}")]
    Internal(String),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::Provider(_) => ErrorKind::ProviderError,
            ConversionError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

impl From<io::Error> for ConversionError {
    fn from(e: io::Error) -> Self {
        ConversionError::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for ConversionError {
    fn from(e: reqwest::Error) -> Self {
        ConversionError::Internal(e.to_string())
    }
}

/// Conversion request parameters. Fixed policy, never taken from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    pub page_range: &'static str,
    pub enable_ocr: bool,
    pub ocr_language: &'static str,
    pub include_formatting: bool,
    pub remove_headers_footers: bool,
    pub remove_footnotes: bool,
    pub remove_tables: bool,
}

/// Clean prose from the first five pages, OCR on, everything decorative stripped.
pub const LLM_READY: ConversionOptions = ConversionOptions {
    page_range: "1-5",
    enable_ocr: true,
    ocr_language: "automatic",
    include_formatting: false,
    remove_headers_footers: true,
    remove_footnotes: true,
    remove_tables: true,
};

/// A backend that turns the PDF at `source` into text at `destination`.
///
/// Carried by the gateway as `Arc<dyn ConversionProvider>` so the remote
/// service can be swapped for the local extractor or a test double.
#[async_trait]
pub trait ConversionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError>;
}

/// Text extracted from one `ValidatedFile`. Only the gateway creates these,
/// and only after the provider reported success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    path: PathBuf,
}

impl ExtractedText {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}

#[derive(Clone)]
pub struct ConversionGateway {
    provider: Arc<dyn ConversionProvider>,
    workspace: Workspace,
}

impl ConversionGateway {
    pub fn new(provider: Arc<dyn ConversionProvider>, workspace: Workspace) -> Self {
        Self {
            provider,
            workspace,
        }
    }

    /// Where `convert` will write the text for `file`. Known before the call
    /// so cleanup can cover a half-written artifact.
    pub fn text_path_for(&self, file: &ValidatedFile) -> PathBuf {
        self.workspace.text_path_for(file.path())
    }

    pub async fn convert(&self, file: &ValidatedFile) -> Result<ExtractedText, ConversionError> {
        info!(
            "Converting {} to text via {}",
            file.path().display(),
            self.provider.name()
        );
        let destination = self.text_path_for(file);

        if let Err(e) = self
            .provider
            .convert(file.path(), &destination, &LLM_READY)
            .await
        {
            match &e {
                ConversionError::Provider(msg) => error!("Conversion provider error: {msg}"),
                ConversionError::Internal(msg) => {
                    error!("Unexpected error during PDF conversion: {msg}")
                }
            }
            return Err(e);
        }

        match tokio::fs::metadata(&destination).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(ConversionError::Internal(format!(
                    "{} reported success but wrote no text to {}",
                    self.provider.name(),
                    destination.display()
                )))
            }
        }

        info!("File successfully converted: {}", destination.display());
        Ok(ExtractedText { path: destination })
    }
}

/// Writes `contents` to `destination` via a temp file in the same directory,
/// replacing any previous artifact in one rename.
pub(crate) async fn write_artifact(
    destination: &Path,
    contents: Vec<u8>,
) -> Result<(), ConversionError> {
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || -> io::Result<()> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.persist(&destination).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConversionError::Internal(format!("artifact writer failed: {e}")))??;
    Ok(())
}

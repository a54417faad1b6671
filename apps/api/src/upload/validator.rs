//! Upload acceptance policy.
//!
//! Gates run cheapest-first and stop at the first failure:
//! presence → extension → MIME → size → page count.
//! Nothing touches the filesystem until every gate has passed.

use std::io::{self, Cursor, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::errors::ErrorKind;
use crate::upload::naming;
use crate::workspace::{remove_artifact, Workspace};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_PAGES: usize = 5;

const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No file selected")]
    MissingFile,

    #[error("File type not allowed")]
    UnsupportedType,

    #[error("Invalid file type or corrupted file")]
    TypeMismatch,

    #[error("File size exceeds maximum limit of {}", display_size(*.limit))]
    TooLarge { size: u64, limit: u64 },

    #[error("PDF exceeds maximum page limit of {limit} pages")]
    TooManyPages { pages: usize, limit: usize },

    #[error("Error reading PDF file: {0}")]
    Unreadable(String),

    #[error("Failed to store upload: {0}")]
    Storage(#[from] io::Error),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MissingFile => ErrorKind::MissingFile,
            ValidationError::UnsupportedType => ErrorKind::UnsupportedType,
            ValidationError::TypeMismatch => ErrorKind::TypeMismatch,
            ValidationError::TooLarge { .. } => ErrorKind::TooLarge,
            ValidationError::TooManyPages { .. } => ErrorKind::TooManyPages,
            ValidationError::Unreadable(_) => ErrorKind::Unreadable,
            ValidationError::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Acceptance limits. Built from `Config` at startup.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Lower-case extensions without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
    pub max_pages: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["pdf".to_string()],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// A file as received from the client, before any gate has run.
#[derive(Debug)]
pub struct UploadCandidate {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    body: Cursor<Bytes>,
}

impl UploadCandidate {
    pub fn new(filename: Option<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            filename,
            content_type,
            body: Cursor::new(data),
        }
    }

    /// Total byte length, measured by seeking to the end.
    /// The read position is restored before returning.
    fn stream_len(&mut self) -> io::Result<u64> {
        let pos = self.body.stream_position()?;
        let len = self.body.seek(SeekFrom::End(0))?;
        self.body.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    fn bytes(&self) -> &[u8] {
        self.body.get_ref()
    }
}

/// An upload that passed every gate and now owns one file in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub path: PathBuf,
}

impl ValidatedFile {
    /// Wraps a path without running any gate.
    #[cfg(test)]
    pub fn existing(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    policy: UploadPolicy,
    workspace: Workspace,
}

impl UploadValidator {
    pub fn new(policy: UploadPolicy, workspace: Workspace) -> Self {
        Self { policy, workspace }
    }

    /// Runs every gate, then persists the upload under a secure name.
    pub async fn validate(
        &self,
        mut candidate: UploadCandidate,
    ) -> Result<ValidatedFile, ValidationError> {
        let filename = match self.check(&mut candidate) {
            Ok(name) => name,
            Err(e) => {
                warn!("File upload validation error: {e}");
                return Err(e);
            }
        };

        self.workspace.ensure().await?;
        let path = self.workspace.dir().join(naming::name_for(&filename));
        discard_on_error(&path, tokio::fs::write(&path, candidate.bytes()).await).await?;
        let path = discard_on_error(&path, tokio::fs::canonicalize(&path).await).await?;

        info!("File successfully uploaded: {}", path.display());
        Ok(ValidatedFile { path })
    }

    /// Re-runs every gate on a file already stored in the workspace, so a path
    /// handed back by a client is only converted if it could have been uploaded.
    pub async fn revalidate(&self, path: PathBuf) -> Result<ValidatedFile, ValidationError> {
        // A text artifact would be converted onto itself.
        if self.workspace.text_path_for(&path).file_name() == path.file_name() {
            warn!("Refusing to analyze conversion artifact {}", path.display());
            return Err(ValidationError::UnsupportedType);
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let data = tokio::fs::read(&path).await?;
        let mut candidate = UploadCandidate::new(filename, None, Bytes::from(data));

        if let Err(e) = self.check(&mut candidate) {
            warn!("Stored file {} failed validation: {e}", path.display());
            return Err(e);
        }
        Ok(ValidatedFile { path })
    }

    /// The gate sequence on its own. Returns the declared filename on success.
    pub fn check(&self, candidate: &mut UploadCandidate) -> Result<String, ValidationError> {
        let filename = match candidate.filename.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(ValidationError::MissingFile),
        };

        let ext = self.allowed_extension(&filename)?;
        self.check_mime(&filename, &ext, candidate.content_type.as_deref())?;

        let size = candidate.stream_len()?;
        if size > self.policy.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.policy.max_file_size,
            });
        }

        if ext == "pdf" {
            let pages = count_pages(candidate.bytes())?;
            info!("PDF page count: {pages}");
            if pages > self.policy.max_pages {
                return Err(ValidationError::TooManyPages {
                    pages,
                    limit: self.policy.max_pages,
                });
            }
        }

        Ok(filename)
    }

    fn allowed_extension(&self, filename: &str) -> Result<String, ValidationError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or(ValidationError::UnsupportedType)?;
        if self.policy.allowed_extensions.iter().any(|a| *a == ext) {
            Ok(ext)
        } else {
            Err(ValidationError::UnsupportedType)
        }
    }

    fn check_mime(
        &self,
        filename: &str,
        ext: &str,
        declared: Option<&str>,
    ) -> Result<(), ValidationError> {
        let expected = expected_mime(ext).ok_or(ValidationError::TypeMismatch)?;
        let inferred = mime_guess::from_path(filename).first_raw();
        if inferred != Some(expected) {
            return Err(ValidationError::TypeMismatch);
        }

        if let Some(declared) = declared {
            let essence = declared
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if !essence.is_empty() && essence != GENERIC_CONTENT_TYPE && essence != expected {
                return Err(ValidationError::TypeMismatch);
            }
        }
        Ok(())
    }
}

/// Passes `result` through; on error the half-stored upload at `path` is
/// removed so nothing is left without an owner.
async fn discard_on_error<T>(path: &Path, result: io::Result<T>) -> Result<T, ValidationError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            error!("Failed to store upload {}: {e}", path.display());
            if let Err(cleanup) = remove_artifact(path).await {
                error!("Failed to cleanup file {}: {cleanup}", path.display());
            }
            Err(ValidationError::Storage(e))
        }
    }
}

/// Renders a byte limit in the largest unit that divides it exactly.
fn display_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    match bytes {
        b if b >= MIB && b % MIB == 0 => format!("{}MB", b / MIB),
        b if b >= KIB && b % KIB == 0 => format!("{}KB", b / KIB),
        b => format!("{b} bytes"),
    }
}

/// The MIME type an allow-listed extension must map to.
fn expected_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "pdf" => Some("application/pdf"),
        other => mime_guess::from_ext(other).first_raw(),
    }
}

fn count_pages(bytes: &[u8]) -> Result<usize, ValidationError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ValidationError::Unreadable(e.to_string()))?;
    Ok(doc.get_pages().len())
}

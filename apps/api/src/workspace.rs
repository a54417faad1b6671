//! The output directory shared by every pipeline invocation.
//!
//! Uploaded PDFs and their extracted text live here only for the duration of
//! one invocation. Names are unique per upload, so concurrent invocations never
//! touch each other's files and no locking is needed.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::errors::ErrorKind;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path is outside the upload directory: {}", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("Workspace I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WorkspaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkspaceError::NotFound(_) => ErrorKind::NotFound,
            WorkspaceError::OutsideWorkspace(_) => ErrorKind::InvalidPath,
            WorkspaceError::Io(_) => ErrorKind::StorageFailure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory if absent. Safe to race with other invocations.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Where the extracted text for `source` is written: same stem, `.txt`,
    /// inside the workspace.
    pub fn text_path_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("extracted_text");
        self.dir.join(format!("{stem}.txt"))
    }

    /// Resolves a caller-supplied path to a regular file directly inside the
    /// workspace. Relative paths are taken relative to the workspace.
    pub async fn resolve(&self, raw: &str) -> Result<PathBuf, WorkspaceError> {
        let requested = Path::new(raw.trim());
        if requested.as_os_str().is_empty()
            || requested
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WorkspaceError::OutsideWorkspace(requested.to_path_buf()));
        }

        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.dir.join(requested)
        };

        let root = tokio::fs::canonicalize(&self.dir).await?;
        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WorkspaceError::NotFound(candidate))
            }
            Err(e) => return Err(e.into()),
        };

        if resolved.parent() != Some(root.as_path()) {
            return Err(WorkspaceError::OutsideWorkspace(resolved));
        }
        if !tokio::fs::metadata(&resolved).await?.is_file() {
            return Err(WorkspaceError::NotFound(resolved));
        }
        Ok(resolved)
    }

    /// Removes every regular file in the workspace. Returns how many were removed.
    pub async fn purge(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() && remove_artifact(&entry.path()).await? {
                removed += 1;
            }
        }
        info!("Purged {removed} file(s) from {}", self.dir.display());
        Ok(removed)
    }
}

/// Unlinks one artifact. An already-absent file is not an error (returns `false`).
pub async fn remove_artifact(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed artifact {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

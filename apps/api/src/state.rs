use std::sync::Arc;

use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::workspace::Workspace;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineOrchestrator>,
    /// Output directory holding in-flight uploads and extracted text.
    pub workspace: Workspace,
    /// Largest upload the validator accepts; the request body limit is derived from it.
    pub max_upload_bytes: u64,
}

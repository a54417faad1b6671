// Upload → Convert → Score → Cleanup.
// Stages report failures as values; the orchestrator decides the outcome and
// always cleans up before returning it.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::conversion::ConversionError;
use crate::errors::{AppError, ErrorKind};
use crate::scoring::gateway::ScoringError;
use crate::scoring::models::ScoreResult;
use crate::scoring::parser::ParseError;
use crate::upload::validator::ValidationError;
use crate::workspace::WorkspaceError;

pub mod handlers;
pub mod orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Uploading,
    Converting,
    Scoring,
    Completed,
    Failed,
}

impl PipelineStage {
    /// Whether `self → next` is a legal edge of the state machine.
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Idle, Converting)
                | (Uploading, Converting)
                | (Converting, Scoring)
                | (Scoring, Completed)
                | (Uploading, Failed)
                | (Converting, Failed)
                | (Scoring, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }
}

/// Any failure that stops a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("CV text file not found")]
    TextMissing,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(e) => e.kind(),
            PipelineError::Conversion(e) => e.kind(),
            PipelineError::Scoring(e) => e.kind(),
            PipelineError::Parse(e) => e.kind(),
            PipelineError::TextMissing => ErrorKind::NotFound,
        }
    }
}

/// The result of one pipeline invocation. Exactly one arm is ever populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success(ScoreResult),
    Failure { kind: ErrorKind, message: String },
}

impl PipelineOutcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }
}

impl From<Result<ScoreResult, PipelineError>> for PipelineOutcome {
    fn from(result: Result<ScoreResult, PipelineError>) -> Self {
        match result {
            Ok(score) => PipelineOutcome::Success(score),
            Err(e) => PipelineOutcome::Failure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::pipeline(e.kind(), e.to_string())
    }
}

impl From<WorkspaceError> for AppError {
    fn from(e: WorkspaceError) -> Self {
        AppError::pipeline(e.kind(), e.to_string())
    }
}

impl IntoResponse for PipelineOutcome {
    fn into_response(self) -> Response {
        match self {
            PipelineOutcome::Success(score) => Json(score).into_response(),
            PipelineOutcome::Failure { kind, message } => {
                AppError::pipeline(kind, message).into_response()
            }
        }
    }
}

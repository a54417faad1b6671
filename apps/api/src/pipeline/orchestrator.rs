//! Pipeline orchestration.
//!
//! Flow: validate → persist → convert → read text → score → parse → cleanup.
//!
//! Each stage returns a `Result`; the first `Err` moves the run to `Failed`
//! and later stages never execute. Cleanup runs on every terminal state and
//! cannot change the outcome already decided.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::conversion::ConversionGateway;
use crate::pipeline::{PipelineError, PipelineOutcome, PipelineStage};
use crate::scoring::gateway::ScoringGateway;
use crate::scoring::models::ScoreResult;
use crate::scoring::parser;
use crate::upload::validator::{UploadCandidate, UploadValidator, ValidatedFile, ValidationError};
use crate::workspace::remove_artifact;

/// Per-invocation bookkeeping: current stage plus every artifact the run owns.
#[derive(Debug)]
struct PipelineRun {
    stage: PipelineStage,
    validated: Option<PathBuf>,
    extracted: Option<PathBuf>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
            validated: None,
            extracted: None,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!("Pipeline {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn finish(&mut self, result: Result<ScoreResult, PipelineError>) -> PipelineOutcome {
        match &result {
            Ok(_) => self.advance(PipelineStage::Completed),
            Err(e) => {
                warn!("Pipeline failed during {:?}: {e}", self.stage);
                if let PipelineError::Parse(parse) = e {
                    debug!("Unparseable model response: {}", parse.raw());
                }
                self.advance(PipelineStage::Failed);
            }
        }
        result.into()
    }

    /// Best-effort removal of every artifact this run created. Failures are
    /// logged and swallowed.
    async fn cleanup(&mut self) {
        debug_assert!(self.stage.is_terminal(), "cleanup before a terminal stage");
        for path in [self.validated.take(), self.extracted.take()]
            .into_iter()
            .flatten()
        {
            match remove_artifact(&path).await {
                Ok(true) => info!("Cleaned up file: {}", path.display()),
                Ok(false) => {}
                Err(e) => error!("Failed to cleanup file {}: {e}", path.display()),
            }
        }
    }
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    validator: UploadValidator,
    converter: ConversionGateway,
    scorer: ScoringGateway,
}

impl PipelineOrchestrator {
    pub fn new(
        validator: UploadValidator,
        converter: ConversionGateway,
        scorer: ScoringGateway,
    ) -> Self {
        Self {
            validator,
            converter,
            scorer,
        }
    }

    /// Uploading stage only. The stored file outlives this call; it is removed
    /// by the `run_file` that consumes it, or by a workspace purge.
    pub async fn upload(&self, candidate: UploadCandidate) -> Result<ValidatedFile, ValidationError> {
        self.validator.validate(candidate).await
    }

    /// Admits a file stored by an earlier `upload` back into the pipeline,
    /// re-running every acceptance gate on its bytes.
    pub async fn stored(&self, path: PathBuf) -> Result<ValidatedFile, ValidationError> {
        self.validator.revalidate(path).await
    }

    /// Idle → Uploading → Converting → Scoring → Completed.
    pub async fn run(&self, candidate: UploadCandidate) -> PipelineOutcome {
        let mut run = PipelineRun::new();
        run.advance(PipelineStage::Uploading);
        let result = match self.validator.validate(candidate).await {
            Ok(file) => {
                run.validated = Some(file.path.clone());
                self.convert_and_score(&mut run, &file).await
            }
            Err(e) => Err(e.into()),
        };
        let outcome = run.finish(result);
        run.cleanup().await;
        outcome
    }

    /// Idle → Converting → Scoring → Completed, for a file stored by `upload`.
    pub async fn run_file(&self, file: ValidatedFile) -> PipelineOutcome {
        let mut run = PipelineRun::new();
        run.validated = Some(file.path.clone());
        let result = self.convert_and_score(&mut run, &file).await;
        let outcome = run.finish(result);
        run.cleanup().await;
        outcome
    }

    async fn convert_and_score(
        &self,
        run: &mut PipelineRun,
        file: &ValidatedFile,
    ) -> Result<ScoreResult, PipelineError> {
        run.advance(PipelineStage::Converting);
        // Registered before the call so a half-written artifact is still cleaned up.
        run.extracted = Some(self.converter.text_path_for(file));
        let text = self.converter.convert(file).await?;

        run.advance(PipelineStage::Scoring);
        let cv_text = text.read().await.map_err(|e| {
            error!("CV text file unreadable {}: {e}", text.path().display());
            PipelineError::TextMissing
        })?;

        let messages = self.scorer.prepare_messages(&cv_text);
        let raw = self.scorer.score(&messages).await?;
        let result = parser::parse(&raw)?;

        info!("CV scored: {}", result.score);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_support::{
        pdf_with_pages, upload, FakeChat, FakeConversion, Harness, Reply,
    };
    use std::time::Duration;

    const GOOD: &str = r#"{"score":"78","recommendations":["Add metrics","Shorten summary"]}"#;

    fn files_in(dir: &std::path::Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_success_returns_result_and_cleans_up() {
        let h = Harness::new(
            FakeConversion::Text("Jane Doe, Rust engineer".into()),
            FakeChat::new(vec![Reply::Text(GOOD.into())]),
        );

        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(2))).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Success(ScoreResult {
                score: "78".into(),
                recommendations: vec!["Add metrics".into(), "Shorten summary".into()],
            })
        );
        assert_eq!(h.converter.calls(), 1);
        let sent = h.chat.requests();
        assert!(sent[0].messages[1].text.contains("Jane Doe, Rust engineer"));
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_never_converts() {
        let h = Harness::new(
            FakeConversion::Text("unused".into()),
            FakeChat::new(vec![Reply::Text(GOOD.into())]),
        );

        let outcome = h
            .pipeline
            .run(upload("cv.pdf", vec![b'x'; 6 * 1024 * 1024]))
            .await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failure { kind: ErrorKind::TooLarge, .. }
        ));
        assert_eq!(h.converter.calls(), 0);
        assert!(h.chat.requests().is_empty());
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_each_gate_failure_short_circuits() {
        let cases: Vec<(crate::upload::validator::UploadCandidate, ErrorKind)> = vec![
            (
                crate::upload::validator::UploadCandidate::new(None, None, bytes::Bytes::new()),
                ErrorKind::MissingFile,
            ),
            (upload("cv.docx", pdf_with_pages(1)), ErrorKind::UnsupportedType),
            (upload("cv.pdf", b"garbage".to_vec()), ErrorKind::Unreadable),
            (upload("cv.pdf", pdf_with_pages(6)), ErrorKind::TooManyPages),
        ];

        for (candidate, expected) in cases {
            let h = Harness::new(
                FakeConversion::Text("unused".into()),
                FakeChat::new(vec![]),
            );
            match h.pipeline.run(candidate).await {
                PipelineOutcome::Failure { kind, .. } => assert_eq!(kind, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
            assert_eq!(h.converter.calls(), 0, "{expected:?}");
            assert!(files_in(h.workspace.dir()).is_empty(), "{expected:?}");
        }
    }

    #[tokio::test]
    async fn test_conversion_failure_stops_before_scoring() {
        let h = Harness::new(
            FakeConversion::ProviderError("quota exceeded".into()),
            FakeChat::new(vec![Reply::Text(GOOD.into())]),
        );

        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await;

        match outcome {
            PipelineOutcome::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::ProviderError);
                assert!(message.contains("quota exceeded"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.chat.requests().is_empty());
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_partial_artifact_is_cleaned_after_conversion_failure() {
        let h = Harness::new(
            FakeConversion::PartialThenFail,
            FakeChat::new(vec![]),
        );
        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await;
        assert!(!outcome.is_success());
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_is_failure_without_result() {
        let h = Harness::new(
            FakeConversion::Text("cv".into()),
            FakeChat::new(vec![Reply::Text(r#"{"score":"78"}"#.into())]),
        );

        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failure { kind: ErrorKind::MalformedResponse, .. }
        ));
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_quirky_response_still_succeeds() {
        let h = Harness::new(
            FakeConversion::Text("cv".into()),
            FakeChat::new(vec![Reply::Text(
                r#"{"score":""""78"""", "recommendations":[]}"#.into(),
            )]),
        );
        match h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await {
            PipelineOutcome::Success(result) => assert_eq!(result.score, "78"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_recovers_on_third_attempt() {
        let h = Harness::new(
            FakeConversion::Text("cv".into()),
            FakeChat::new(vec![
                Reply::Connectivity,
                Reply::Connectivity,
                Reply::Text(GOOD.into()),
            ]),
        );
        let start = tokio::time::Instant::now();

        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await;

        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(h.chat.requests().len(), 3);
        // Two backoff cycles: 2s + 4s.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(6), "{waited:?}");
        assert!(waited < Duration::from_secs(7), "{waited:?}");
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_exhausted_after_five_attempts() {
        let h = Harness::new(
            FakeConversion::Text("cv".into()),
            FakeChat::new(vec![Reply::Connectivity; 5]),
        );

        let outcome = h.pipeline.run(upload("cv.pdf", pdf_with_pages(1))).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failure { kind: ErrorKind::ConnectivityExhausted, .. }
        ));
        assert_eq!(h.chat.requests().len(), 5);
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_run_file_consumes_earlier_upload() {
        let h = Harness::new(
            FakeConversion::Text("cv".into()),
            FakeChat::new(vec![Reply::Text(GOOD.into())]),
        );

        let file = h
            .pipeline
            .upload(upload("cv.pdf", pdf_with_pages(1)))
            .await
            .unwrap();
        assert!(file.path.exists());

        let outcome = h.pipeline.run_file(file.clone()).await;
        assert!(outcome.is_success());
        assert!(!file.path.exists());
        assert!(files_in(h.workspace.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_twice_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("a.pdf");
        std::fs::write(&pdf, b"x").unwrap();

        let mut run = PipelineRun::new();
        run.stage = PipelineStage::Failed;
        run.validated = Some(pdf.clone());
        run.extracted = Some(tmp.path().join("a.txt")); // never written
        run.cleanup().await;
        run.cleanup().await;

        assert!(!pdf.exists());
        assert!(run.validated.is_none() && run.extracted.is_none());
    }
}

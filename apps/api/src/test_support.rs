//! Shared fixtures for unit tests: synthetic PDFs, in-memory providers, and a
//! fully wired pipeline over a temporary workspace.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::{dictionary, Document, Object, Stream};

use crate::conversion::{
    write_artifact, ConversionError, ConversionGateway, ConversionOptions, ConversionProvider,
};
use crate::llm_client::retry::RetryPolicy;
use crate::llm_client::{ChatRequest, ChatTransport, LlmError};
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::scoring::gateway::ScoringGateway;
use crate::scoring::prompts::PromptSet;
use crate::state::AppState;
use crate::upload::validator::{UploadCandidate, UploadPolicy, UploadValidator};
use crate::workspace::Workspace;

/// A minimal, parseable PDF with `pages` blank pages.
pub fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(pages);
    for n in 0..pages {
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", n + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// A candidate as a browser would send it.
pub fn upload(name: &str, data: Vec<u8>) -> UploadCandidate {
    UploadCandidate::new(
        Some(name.to_string()),
        Some("application/pdf".to_string()),
        Bytes::from(data),
    )
}

#[derive(Debug, Clone)]
pub enum FakeConversion {
    Text(String),
    ProviderError(String),
    /// Reports success without writing anything.
    NoOutput,
    /// Writes a partial artifact, then fails.
    PartialThenFail,
}

pub struct FakeConverter {
    behaviour: FakeConversion,
    calls: AtomicU32,
    last_options: Mutex<Option<ConversionOptions>>,
}

impl FakeConverter {
    pub fn new(behaviour: FakeConversion) -> Self {
        Self {
            behaviour,
            calls: AtomicU32::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<ConversionOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionProvider for FakeConverter {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        assert!(source.exists(), "converter called without a source file");

        match &self.behaviour {
            FakeConversion::Text(text) => write_artifact(destination, text.clone().into_bytes()).await,
            FakeConversion::ProviderError(msg) => Err(ConversionError::Provider(msg.clone())),
            FakeConversion::NoOutput => Ok(()),
            FakeConversion::PartialThenFail => {
                std::fs::write(destination, b"Jane D")?;
                Err(ConversionError::Internal("connection reset mid-download".into()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Connectivity,
    Api(u16),
}

/// Scripted chat transport: pops one reply per call and records every request.
pub struct FakeChat {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for FakeChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Connectivity) => Err(LlmError::Connectivity("connection refused".into())),
            Some(Reply::Api(status)) => Err(LlmError::Api {
                status,
                message: "scripted failure".into(),
            }),
            None => panic!("FakeChat ran out of scripted replies"),
        }
    }
}

/// A pipeline over a fresh temp workspace with fake providers.
pub struct Harness {
    pub pipeline: PipelineOrchestrator,
    pub workspace: Workspace,
    pub converter: Arc<FakeConverter>,
    pub chat: Arc<FakeChat>,
    _tmp: tempfile::TempDir,
}

impl Harness {
    pub fn new(conversion: FakeConversion, chat: FakeChat) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path().join("output"));
        let converter = Arc::new(FakeConverter::new(conversion));
        let chat = Arc::new(chat);

        let pipeline = PipelineOrchestrator::new(
            UploadValidator::new(UploadPolicy::default(), workspace.clone()),
            ConversionGateway::new(converter.clone(), workspace.clone()),
            ScoringGateway::new(chat.clone(), RetryPolicy::connectivity(), PromptSet::default()),
        );

        Self {
            pipeline,
            workspace,
            converter,
            chat,
            _tmp: tmp,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            pipeline: Arc::new(self.pipeline.clone()),
            workspace: self.workspace.clone(),
            max_upload_bytes: UploadPolicy::default().max_file_size,
        }
    }
}

pub const BOUNDARY: &str = "----cvscore-test-boundary";

/// Encodes one file field as `multipart/form-data`.
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[test]
fn test_fixture_pdf_page_count() {
    let doc = Document::load_mem(&pdf_with_pages(3)).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
}

//! The scoring call: two messages in, schema-constrained JSON text out.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::errors::ErrorKind;
use crate::llm_client::retry::{RetryError, RetryPolicy};
use crate::llm_client::{ChatMessage, ChatRequest, ChatTransport, LlmError};
use crate::scoring::prompts::PromptSet;

/// The scoring summary is terse; anything longer is a runaway answer.
pub const MAX_TOKENS: u32 = 512;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring service unreachable after {attempts} attempts: {message}")]
    ConnectivityExhausted { attempts: u32, message: String },

    #[error("Scoring service rejected the request: {0}")]
    ProviderRejected(String),
}

impl ScoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::ConnectivityExhausted { .. } => ErrorKind::ConnectivityExhausted,
            ScoringError::ProviderRejected(_) => ErrorKind::ProviderRejected,
        }
    }
}

impl From<RetryError<LlmError>> for ScoringError {
    fn from(e: RetryError<LlmError>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => ScoringError::ConnectivityExhausted {
                attempts,
                message: last.to_string(),
            },
            RetryError::Fatal(e) => ScoringError::ProviderRejected(e.to_string()),
        }
    }
}

/// Strict structured-output format: an object with exactly `score` (string)
/// and `recommendations` (array of strings), no other properties.
pub fn rating_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "rating_response",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "recommendations": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "score": { "type": "string" }
                },
                "required": ["score", "recommendations"],
                "additionalProperties": false
            }
        }
    })
}

#[derive(Clone)]
pub struct ScoringGateway {
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
    prompts: PromptSet,
}

impl ScoringGateway {
    pub fn new(transport: Arc<dyn ChatTransport>, retry: RetryPolicy, prompts: PromptSet) -> Self {
        Self {
            transport,
            retry,
            prompts,
        }
    }

    /// System instructions first, then the CV text inside the input template.
    pub fn prepare_messages(&self, cv_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.prompts.system.clone()),
            ChatMessage::user(self.prompts.render_input(cv_text)),
        ]
    }

    /// Sends `messages` and returns the raw response text.
    ///
    /// Only connectivity failures are retried, per `self.retry`; anything the
    /// provider answers with (auth, bad request, rate limit, refusal) is final.
    pub async fn score(&self, messages: &[ChatMessage]) -> Result<String, ScoringError> {
        info!("Initiating CV scoring ({} messages)", messages.len());
        let request = ChatRequest {
            messages: messages.to_vec(),
            response_format: rating_response_format(),
            max_tokens: MAX_TOKENS,
        };

        let result = self
            .retry
            .run(|| self.transport.complete(&request), LlmError::is_connectivity)
            .await;

        match result {
            Ok(text) => {
                info!("Successfully retrieved CV score response");
                Ok(text)
            }
            Err(e) => {
                let e = ScoringError::from(e);
                error!("Error processing CV score: {e}");
                Err(e)
            }
        }
    }
}

//! Strict decoding of the model's structured answer.

use std::borrow::Cow;

use thiserror::Error;
use tracing::error;

use crate::errors::ErrorKind;
use crate::scoring::models::ScoreResult;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON response from model: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedResponse
    }

    /// The untouched response text, kept for diagnostics.
    pub fn raw(&self) -> &str {
        match self {
            ParseError::MalformedResponse { raw, .. } => raw,
        }
    }
}

/// Decodes `raw` into a `ScoreResult`.
///
/// The text is decoded as-is first; only if that fails are the quote-quirk
/// rewrites from [`quirks::candidates`] tried, in order. Every candidate goes
/// through the same strict decoder, so the quirk handling can never produce a
/// partially populated result.
pub fn parse(raw: &str) -> Result<ScoreResult, ParseError> {
    let first_error = match serde_json::from_str::<ScoreResult>(raw) {
        Ok(result) => return Ok(result),
        Err(e) => e,
    };

    for candidate in quirks::candidates(raw) {
        if let Ok(result) = serde_json::from_str::<ScoreResult>(&candidate) {
            return Ok(result);
        }
    }

    error!("Failed to parse model response: {first_error}");
    Err(ParseError::MalformedResponse {
        reason: first_error.to_string(),
        raw: raw.to_string(),
    })
}

/// Workaround for a provider escaping bug that emits `""""` where a quoted
/// string was intended. Four consecutive quotes cannot occur in valid JSON,
/// so rewriting them never changes a well-formed answer. Delete this module
/// (and its call in `parse`) once the provider is fixed.
pub mod quirks {
    use super::Cow;

    const QUAD_QUOTE: &str = "\"\"\"\"";

    /// Rewrites to try, most conservative first:
    /// `""""` → `""` (an intended empty string), then `""""` → `"` (a doubled
    /// delimiter around a value, e.g. `""""78""""` → `"78"`).
    pub fn candidates(raw: &str) -> Vec<Cow<'_, str>> {
        if !raw.contains(QUAD_QUOTE) {
            return Vec::new();
        }
        vec![
            Cow::Owned(raw.replace(QUAD_QUOTE, "\"\"")),
            Cow::Owned(raw.replace(QUAD_QUOTE, "\"")),
        ]
    }
}

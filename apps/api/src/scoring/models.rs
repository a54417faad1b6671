use serde::{Deserialize, Serialize};

/// The model's verdict on a CV. Both fields are required on the wire and
/// unknown fields are rejected, so a partial result can never be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreResult {
    pub score: String,
    pub recommendations: Vec<String>,
}

//! Prompts for CV scoring.
//!
//! Built-in defaults live here; a deployment can override either prompt with
//! `system_prompt.txt` / `input_prompt.txt` in `PROMPTS_DIR`, read once at startup.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Placeholder in the input template replaced by the extracted CV text.
pub const INPUT_PLACEHOLDER: &str = "{input_string}";

pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";
pub const INPUT_PROMPT_FILE: &str = "input_prompt.txt";

/// System prompt for CV scoring. Sets the reviewer persona and the output contract.
pub const CV_SCORE_SYSTEM: &str = "You are an experienced technical recruiter and career coach. \
    You review CVs and rate how effectively they present the candidate to a hiring manager. \
    Judge clarity, structure, quantified impact, relevance of skills, and concision. \
    Respond with a JSON object containing exactly two fields: \
    `score`, the overall rating as a whole number from 0 to 100 written as a string, and \
    `recommendations`, a short list of concrete, actionable improvements, most important first. \
    Do NOT include any other fields or any text outside the JSON object.";

/// Input template. Replace `{input_string}` before sending.
pub const CV_SCORE_INPUT_TEMPLATE: &str = r#"Score the following CV and recommend improvements.

Keep each recommendation to one sentence. Give at most five.

CV:
"""
{input_string}
"""
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub input_template: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: CV_SCORE_SYSTEM.to_string(),
            input_template: CV_SCORE_INPUT_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    /// Loads overrides from `dir`. Both files must exist and the input
    /// template must contain `{input_string}`.
    pub fn load(dir: &Path) -> Result<Self> {
        let system = read_prompt(dir, SYSTEM_PROMPT_FILE)?;
        let input_template = read_prompt(dir, INPUT_PROMPT_FILE)?;
        if !input_template.contains(INPUT_PLACEHOLDER) {
            bail!("{INPUT_PROMPT_FILE} must contain the {INPUT_PLACEHOLDER} placeholder");
        }
        Ok(Self {
            system,
            input_template,
        })
    }

    pub fn render_input(&self, cv_text: &str) -> String {
        self.input_template.replace(INPUT_PLACEHOLDER, cv_text)
    }
}

fn read_prompt(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    std::fs::read_to_string(&path)
        .with_context(|| format!("Prompt file not found: {}", path.display()))
}

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::upload::validator::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_PAGES};

/// Which backend turns validated PDFs into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionBackend {
    /// Remote ConvertAPI service (default).
    ConvertApi,
    /// In-process extraction via `pdf-extract`. No network, no OCR.
    Local,
}

impl FromStr for ConversionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "convertapi" | "convert_api" => Ok(ConversionBackend::ConvertApi),
            "local" => Ok(ConversionBackend::Local),
            other => bail!("Unknown CONVERSION_BACKEND '{other}' (expected 'convertapi' or 'local')"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Constructed once in `main` and handed to each component; nothing below
/// `main` reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub conversion_backend: ConversionBackend,
    pub convert_api_secret: Option<String>,
    pub convert_api_base_url: String,
    pub output_dir: PathBuf,
    pub prompts_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
    pub max_pages: usize,
    pub cors_origin: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let conversion_backend: ConversionBackend = optional_env("CONVERSION_BACKEND")
            .unwrap_or_else(|| "convertapi".to_string())
            .parse()?;

        let convert_api_secret = optional_env("CONVERT_API_SECRET");
        if conversion_backend == ConversionBackend::ConvertApi && convert_api_secret.is_none() {
            bail!("CONVERT_API_SECRET must be set when CONVERSION_BACKEND is 'convertapi'");
        }

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_model: optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| crate::llm_client::OPENAI_BASE_URL.to_string()),
            conversion_backend,
            convert_api_secret,
            convert_api_base_url: optional_env("CONVERT_API_BASE_URL").unwrap_or_else(|| {
                crate::conversion::convert_api::CONVERT_API_BASE_URL.to_string()
            }),
            output_dir: optional_env("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            prompts_dir: optional_env("PROMPTS_DIR").map(PathBuf::from),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_FILE_SIZE)?,
            max_pages: parse_env("MAX_PAGES", DEFAULT_MAX_PAGES)?,
            cors_origin: optional_env("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:5000".to_string()),
            port: parse_env("PORT", 5000)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and empty variables are treated the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

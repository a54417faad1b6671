//! ConvertAPI client (`POST /convert/pdf/to/txt`).
//!
//! The PDF travels base64-encoded inside a JSON parameter list and the text
//! comes back base64-encoded in `Files[0].FileData`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::conversion::{write_artifact, ConversionError, ConversionOptions, ConversionProvider};

pub const CONVERT_API_BASE_URL: &str = "https://v2.convertapi.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertRequest<'a> {
    parameters: Vec<Parameter<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_value: Option<FileValue<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FileValue<'a> {
    name: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertResponse {
    #[serde(default)]
    files: Vec<ConvertedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertedFile {
    file_name: String,
    file_data: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertApiErrorBody {
    code: Option<i64>,
    message: String,
}

impl<'a> Parameter<'a> {
    fn value(name: &'a str, value: Value) -> Self {
        Self {
            name,
            value: Some(value),
            file_value: None,
        }
    }
}

fn build_parameters<'a>(
    file_name: &'a str,
    file_data: String,
    options: &ConversionOptions,
) -> Vec<Parameter<'a>> {
    vec![
        Parameter {
            name: "File",
            value: None,
            file_value: Some(FileValue {
                name: file_name,
                data: file_data,
            }),
        },
        Parameter::value("StoreFile", json!(false)),
        Parameter::value("PageRange", json!(options.page_range)),
        Parameter::value("EnableOcr", json!(options.enable_ocr)),
        Parameter::value("OcrLanguage", json!(options.ocr_language)),
        Parameter::value("IncludeFormatting", json!(options.include_formatting)),
        Parameter::value("RemoveHeadersFooters", json!(options.remove_headers_footers)),
        Parameter::value("RemoveFootnotes", json!(options.remove_footnotes)),
        Parameter::value("RemoveTables", json!(options.remove_tables)),
    ]
}

/// Pulls a readable message out of a ConvertAPI error body, falling back to the raw body.
fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ConvertApiErrorBody>(body) {
        Ok(ConvertApiErrorBody {
            code: Some(code),
            message,
        }) => format!("{message} (code {code}, status {status})"),
        Ok(ConvertApiErrorBody { message, .. }) => format!("{message} (status {status})"),
        Err(_) if body.trim().is_empty() => format!("status {status}"),
        Err(_) => format!("{} (status {status})", body.trim()),
    }
}

#[derive(Clone)]
pub struct ConvertApiClient {
    client: Client,
    secret: String,
    base_url: String,
}

impl ConvertApiClient {
    pub fn new(secret: String, base_url: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn file_contents(&self, file: ConvertedFile) -> Result<Vec<u8>, ConversionError> {
        if let Some(data) = file.file_data {
            return STANDARD.decode(data.trim()).map_err(|e| {
                ConversionError::Provider(format!("undecodable file data for {}: {e}", file.file_name))
            });
        }
        let url = file.url.ok_or_else(|| {
            ConversionError::Provider(format!("no data or URL returned for {}", file.file_name))
        })?;
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ConversionError::Provider(format!(
                "download of {} failed with status {}",
                file.file_name,
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ConversionProvider for ConvertApiClient {
    fn name(&self) -> &'static str {
        "convertapi"
    }

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError> {
        let pdf = tokio::fs::read(source).await?;
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf");

        let body = ConvertRequest {
            parameters: build_parameters(file_name, STANDARD.encode(&pdf), options),
        };

        let response = self
            .client
            .post(format!("{}/convert/pdf/to/txt", self.base_url))
            .bearer_auth(&self.secret)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::Provider(provider_message(status, &body)));
        }

        let parsed: ConvertResponse = response
            .json()
            .await
            .map_err(|e| ConversionError::Provider(format!("unreadable response: {e}")))?;
        let file = parsed
            .files
            .into_iter()
            .next()
            .ok_or_else(|| ConversionError::Provider("response contained no files".to_string()))?;

        let text = self.file_contents(file).await?;
        debug!("ConvertAPI returned {} bytes of text", text.len());
        write_artifact(destination, text).await
    }
}

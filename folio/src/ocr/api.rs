use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::{FolioError, Result};
use crate::models::{OcrOutput, PageRecord};

const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Clone, Debug)]
pub struct DocumentAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    processor_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
    skip_human_review: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: ResponseDocument,
}

#[derive(Debug, Deserialize)]
struct ResponseDocument {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<ResponsePage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePage {
    #[serde(default)]
    page_number: u32,
    #[serde(default)]
    dimension: Option<Dimension>,
    #[serde(default)]
    layout: Option<Layout>,
}

#[derive(Debug, Default, Deserialize)]
struct Dimension {
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
}

#[derive(Debug, Default, Deserialize)]
struct Layout {
    #[serde(default)]
    confidence: f32,
}

impl DocumentAiClient {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let processor_name = config
            .processor_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                FolioError::Configuration("OCR processor name required".to_string())
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FolioError::Ocr(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            processor_name,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:process", self.base_url, self.processor_name)
    }

    /// Send one chunk for recognition. Rate limiting and server errors come back as
    /// `FolioError::Ocr` (retryable), other client errors as `OcrRejected`. Transport
    /// failures surface as `FolioError::Http`.
    pub async fn process(&self, chunk_bytes: &[u8]) -> Result<OcrOutput> {
        let request = ProcessRequest {
            raw_document: RawDocument {
                content: STANDARD.encode(chunk_bytes),
                mime_type: PDF_MIME_TYPE.to_string(),
            },
            skip_human_review: true,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("x-goog-api-key", api_key);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let parsed: ProcessResponse = response
            .json()
            .await
            .map_err(|e| FolioError::Ocr(format!("Failed to parse OCR response: {e}")))?;

        debug!(
            pages = parsed.document.pages.len(),
            text_len = parsed.document.text.len(),
            "OCR response received"
        );

        Ok(into_output(parsed.document))
    }
}

fn classify_status(status: StatusCode, body: String) -> FolioError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        FolioError::Ocr(format!("OCR request failed: {status} - {body}"))
    } else {
        FolioError::OcrRejected(format!("{status} - {body}"))
    }
}

fn into_output(document: ResponseDocument) -> OcrOutput {
    let pages = document
        .pages
        .into_iter()
        .enumerate()
        .map(|(position, page)| {
            let dimension = page.dimension.unwrap_or_default();
            PageRecord {
                page_number: if page.page_number == 0 {
                    position as u32 + 1
                } else {
                    page.page_number
                },
                width: dimension.width,
                height: dimension.height,
                confidence: page.layout.unwrap_or_default().confidence,
            }
        })
        .collect();

    OcrOutput {
        text: document.text,
        pages,
    }
}

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{FolioError, Result};
use crate::models::{
    AnalysisResult, BoundingBox, Classifications, Label, VisualElements, VisualObject,
};

const FEATURES: &[&str] = &[
    "DOCUMENT_TEXT_DETECTION",
    "LABEL_DETECTION",
    "OBJECT_LOCALIZATION",
];

#[derive(Clone, Debug)]
pub struct VisionClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig {
    content: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRequest {
    input_config: InputConfig,
    features: Vec<Feature>,
    pages: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct BatchRequest<T> {
    requests: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ImageBatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Debug, Deserialize)]
struct FileBatchResponse {
    #[serde(default)]
    responses: Vec<ImageBatchResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    #[serde(default)]
    localized_object_annotations: Vec<ObjectAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<TextPage>,
}

#[derive(Debug, Deserialize)]
struct TextPage {
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    property: Option<TextProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextProperty {
    #[serde(default)]
    detected_languages: Vec<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    topicality: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectAnnotation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

impl VisionClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| FolioError::Analysis("API key required for Vision".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FolioError::Analysis(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Analyze a document. PDFs go through `files:annotate` restricted to the first
    /// page; anything else is sent as an image.
    pub async fn analyze(&self, content: &[u8], name: &str) -> Result<AnalysisResult> {
        let encoded = STANDARD.encode(content);

        let response = if is_pdf(content, name) {
            let request = BatchRequest {
                requests: vec![FileRequest {
                    input_config: InputConfig {
                        content: encoded,
                        mime_type: "application/pdf".to_string(),
                    },
                    features: features(),
                    pages: vec![1],
                }],
            };
            let batch: FileBatchResponse = self.post("files:annotate", &request).await?;
            batch
                .responses
                .into_iter()
                .next()
                .and_then(|file| file.responses.into_iter().next())
        } else {
            let request = BatchRequest {
                requests: vec![ImageRequest {
                    image: ImageContent { content: encoded },
                    features: features(),
                }],
            };
            let batch: ImageBatchResponse = self.post("images:annotate", &request).await?;
            batch.responses.into_iter().next()
        };

        let response =
            response.ok_or_else(|| FolioError::Analysis("Empty Vision response".to_string()))?;

        if let Some(status) = &response.error {
            return Err(FolioError::Analysis(format!(
                "Vision annotation failed: {}",
                status.message
            )));
        }

        debug!(
            labels = response.label_annotations.len(),
            objects = response.localized_object_annotations.len(),
            "Vision response received"
        );

        Ok(into_result(response))
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| FolioError::Analysis(format!("Vision request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FolioError::Analysis(format!(
                "Vision request failed: {status} - {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FolioError::Analysis(format!("Failed to parse Vision response: {e}")))
    }
}

fn features() -> Vec<Feature> {
    FEATURES.iter().map(|kind| Feature { kind: *kind }).collect()
}

fn is_pdf(content: &[u8], name: &str) -> bool {
    content.starts_with(b"%PDF") || name.to_lowercase().ends_with(".pdf")
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

fn into_result(response: AnnotateResponse) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    if let Some(annotation) = response.full_text_annotation {
        if let Some(first_page) = annotation.pages.first() {
            result.confidence = first_page.confidence;
            result.classifications = Classifications {
                language: first_page
                    .property
                    .as_ref()
                    .and_then(|p| p.detected_languages.first())
                    .map(|l| l.language_code.clone()),
                ..Classifications::default()
            };
        }
        result.text = annotation.text;
    }

    result.labels = response
        .label_annotations
        .into_iter()
        .map(|label| Label {
            description: label.description,
            score: round4(label.score),
            topicality: round4(label.topicality),
        })
        .collect();

    result.visual_elements = VisualElements {
        objects: response
            .localized_object_annotations
            .into_iter()
            .map(|object| {
                let vertices = object
                    .bounding_poly
                    .map(|poly| poly.normalized_vertices)
                    .unwrap_or_default();
                let bounding_box = match (vertices.first(), vertices.get(2)) {
                    (Some(top_left), Some(bottom_right)) => BoundingBox {
                        left: top_left.x,
                        top: top_left.y,
                        right: bottom_right.x,
                        bottom: bottom_right.y,
                    },
                    _ => BoundingBox::default(),
                };
                VisualObject {
                    name: object.name,
                    confidence: round4(object.score),
                    bounding_box,
                }
            })
            .collect(),
    };

    result
}

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::OcrConfig;
use crate::error::{FolioError, Result};
use crate::models::OcrOutput;

use super::api::DocumentAiClient;

/// Recognize the text and page layout of one chunk (a standalone PDF).
///
/// Implementations may fail with a transient error (see
/// [`FolioError::is_transient`]); the chunk processor decides whether to retry.
#[async_trait]
pub trait OcrCapability: Send + Sync {
    async fn recognize(&self, chunk_bytes: &[u8]) -> Result<OcrOutput>;
}

#[derive(Clone)]
enum OcrBackend {
    Api { client: DocumentAiClient },
    Unavailable { reason: String },
}

#[derive(Clone)]
pub struct OcrProvider {
    backend: OcrBackend,
}

impl OcrProvider {
    pub fn new(config: &OcrConfig) -> Self {
        let backend = match DocumentAiClient::new(config) {
            Ok(client) => {
                info!(base_url = %config.base_url, "Document AI OCR backend initialized");
                OcrBackend::Api { client }
            }
            Err(e) => {
                let reason = format!("Document AI OCR backend unavailable: {e}");
                warn!("{}", reason);
                OcrBackend::Unavailable { reason }
            }
        };

        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, OcrBackend::Unavailable { .. })
    }
}

#[async_trait]
impl OcrCapability for OcrProvider {
    async fn recognize(&self, chunk_bytes: &[u8]) -> Result<OcrOutput> {
        match &self.backend {
            OcrBackend::Api { client } => client.process(chunk_bytes).await,
            OcrBackend::Unavailable { reason } => Err(FolioError::OcrUnavailable(reason.clone())),
        }
    }
}

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::{FolioError, Result};
use crate::models::{AnalysisResult, AnalysisSummary};

use super::api::VisionClient;

#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    async fn analyze(&self, content: &[u8], name: &str) -> Result<AnalysisResult>;
}

#[derive(Clone)]
enum AnalysisBackend {
    Api { client: VisionClient },
    Disabled,
    Unavailable { reason: String },
}

#[derive(Clone)]
pub struct AnalysisProvider {
    backend: AnalysisBackend,
}

impl AnalysisProvider {
    pub fn new(config: &AnalysisConfig) -> Self {
        if !config.enabled {
            info!("Secondary analysis disabled");
            return Self {
                backend: AnalysisBackend::Disabled,
            };
        }

        let backend = match VisionClient::new(config) {
            Ok(client) => {
                info!(base_url = %config.base_url, "Vision analysis backend initialized");
                AnalysisBackend::Api { client }
            }
            Err(e) => {
                let reason = format!("Vision analysis backend unavailable: {e}");
                warn!("{}", reason);
                AnalysisBackend::Unavailable { reason }
            }
        };

        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, AnalysisBackend::Api { .. })
    }
}

#[async_trait]
impl AnalysisCapability for AnalysisProvider {
    async fn analyze(&self, content: &[u8], name: &str) -> Result<AnalysisResult> {
        match &self.backend {
            AnalysisBackend::Api { client } => client.analyze(content, name).await,
            AnalysisBackend::Disabled => Err(FolioError::AnalysisUnavailable(
                "analysis disabled by configuration".to_string(),
            )),
            AnalysisBackend::Unavailable { reason } => {
                Err(FolioError::AnalysisUnavailable(reason.clone()))
            }
        }
    }
}

/// How the secondary analysis of a job ended.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    Failed(String),
    TimedOut,
}

impl AnalysisOutcome {
    /// Split into the metadata summary and the analysis text. Anything but
    /// `Completed` gives the empty summary and empty text.
    pub fn into_parts(self) -> (AnalysisSummary, String) {
        match self {
            AnalysisOutcome::Completed(result) => {
                let summary = AnalysisSummary::from(&result);
                (summary, result.text)
            }
            AnalysisOutcome::Failed(_) | AnalysisOutcome::TimedOut => {
                (AnalysisSummary::default(), String::new())
            }
        }
    }
}

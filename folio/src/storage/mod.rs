mod local;

pub use local::LocalArtifactStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArtifactPaths, DocumentResult};

/// The three artifacts persisted for a finished job.
pub struct Artifacts<'a> {
    pub record: &'a DocumentResult,
    pub text: &'a str,
    pub summary: &'a str,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, name: &str, artifacts: Artifacts<'_>) -> Result<ArtifactPaths>;
}

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::models::ArtifactPaths;

use super::{ArtifactStore, Artifacts};

/// Writes artifacts into one flat output directory as
/// `{timestamp}_{stem}_results.json`, `_text.txt` and `_summary.txt`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    base_path: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn base_filename(name: &str) -> String {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string());
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        format!("{timestamp}_{stem}")
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, name: &str, artifacts: Artifacts<'_>) -> Result<ArtifactPaths> {
        let base_filename = Self::base_filename(name);

        let paths = ArtifactPaths {
            json: self.base_path.join(format!("{base_filename}_results.json")),
            text: self.base_path.join(format!("{base_filename}_text.txt")),
            summary: self.base_path.join(format!("{base_filename}_summary.txt")),
        };

        let record = serde_json::to_vec_pretty(artifacts.record)?;
        tokio::fs::write(&paths.json, record).await?;
        tokio::fs::write(&paths.text, artifacts.text).await?;
        tokio::fs::write(&paths.summary, artifacts.summary).await?;

        info!(json = %paths.json.display(), "Artifacts saved");
        Ok(paths)
    }
}

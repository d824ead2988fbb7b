use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::ChunkResult;

/// Append-only log of chunk results, one JSON object per line.
///
/// Each append is flushed and synced before it returns, so a result that was
/// acknowledged survives a crash. A crash mid-append leaves at most one torn
/// final line, which [`CheckpointLog::recover`] skips.
pub struct CheckpointLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CheckpointLog {
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, result: &ChunkResult) -> Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;

        debug!(chunk_index = result.chunk_index, "Chunk result checkpointed");
        Ok(())
    }

    /// Stream a log back into results ordered by chunk index. Lines that do not
    /// parse are skipped with a warning; when an index appears twice the first
    /// record wins.
    pub async fn recover(path: impl AsRef<Path>) -> Result<Vec<ChunkResult>> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();

        let mut results: BTreeMap<usize, ChunkResult> = BTreeMap::new();
        let mut line_number = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkResult>(&line) {
                Ok(result) => {
                    if results.contains_key(&result.chunk_index) {
                        warn!(
                            chunk_index = result.chunk_index,
                            line = line_number,
                            "Duplicate checkpoint record ignored"
                        );
                        continue;
                    }
                    results.insert(result.chunk_index, result);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = line_number,
                        error = %e,
                        "Skipping unreadable checkpoint line"
                    );
                }
            }
        }

        Ok(results.into_values().collect())
    }
}

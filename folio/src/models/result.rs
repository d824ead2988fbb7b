use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AnalysisSummary;

/// Layout information for one recognized page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page number within its chunk (1-based) until the merge step renumbers it
    /// across the whole document.
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    /// Layout confidence in `[0, 1]`.
    pub confidence: f32,
}

/// What the OCR capability returns for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub pages: Vec<PageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub text: String,
    pub pages: Vec<PageRecord>,
    pub created_at: DateTime<Utc>,
}

impl ChunkResult {
    pub fn new(chunk_index: usize, output: OcrOutput) -> Self {
        Self {
            chunk_index,
            text: output.text,
            pages: output.pages,
            created_at: Utc::now(),
        }
    }

    /// A cached result may have been produced for a chunk at a different position,
    /// possibly in another document. Re-anchor it to the chunk being served.
    pub fn with_index(self, chunk_index: usize) -> Self {
        Self {
            chunk_index,
            ..self
        }
    }
}

/// How one chunk ended. Failure is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Succeeded {
        chunk_index: usize,
        cache_hit: bool,
        attempts: u32,
    },
    Failed {
        chunk_index: usize,
        attempts: u32,
        error: String,
    },
}

impl ChunkOutcome {
    pub fn chunk_index(&self) -> usize {
        match self {
            ChunkOutcome::Succeeded { chunk_index, .. } | ChunkOutcome::Failed { chunk_index, .. } => {
                *chunk_index
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    /// Wall time from job start until the artifacts were rendered for writing.
    pub processing_time_secs: f64,
    pub chunks_total: usize,
    pub chunks_succeeded: usize,
    /// Chunks with no checkpointed result: permanent failures plus, when the job
    /// timed out, chunks that never finished.
    pub chunks_failed: usize,
    pub cache_hits: usize,
    pub timed_out: bool,
    pub analysis: AnalysisSummary,
}

/// The merged record for a whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub name: String,
    pub text: String,
    /// Pages of every successful chunk, renumbered `1..=n` in chunk order.
    pub pages: Vec<PageRecord>,
    #[serde(default)]
    pub analysis_text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub json: PathBuf,
    pub text: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
}

/// Returned by `Orchestrator::process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: JobStatus,
    pub metadata: DocumentMetadata,
    pub file_paths: ArtifactPaths,
}

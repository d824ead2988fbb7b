use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::error::{FolioError, Result};
use crate::models::{ArtifactPaths, DocumentMetadata, DocumentResult, PageRecord};
use crate::storage::{ArtifactStore, Artifacts};

use super::checkpoint::CheckpointLog;

/// Merges a job's checkpoint log into one document record and persists it.
#[derive(Clone)]
pub struct ResultAggregator {
    store: Arc<dyn ArtifactStore>,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Build the merged record from the log at `log_path`. `metadata.chunks_total`
    /// must already be set; the success and failure counts are derived from the log.
    pub async fn merge(
        &self,
        log_path: &Path,
        mut metadata: DocumentMetadata,
        analysis_text: String,
    ) -> Result<DocumentResult> {
        let results = CheckpointLog::recover(log_path).await?;
        if results.is_empty() {
            return Err(FolioError::Aggregation(format!(
                "no chunk of {} produced a result",
                metadata.filename
            )));
        }

        let mut text = String::new();
        let mut pages = Vec::new();
        for result in &results {
            if !text.is_empty() && !text.ends_with('\n') && !result.text.is_empty() {
                text.push('\n');
            }
            text.push_str(&result.text);

            for page in &result.pages {
                pages.push(PageRecord {
                    page_number: pages.len() as u32 + 1,
                    ..page.clone()
                });
            }
        }

        metadata.chunks_succeeded = results.len();
        metadata.chunks_failed = metadata.chunks_total.saturating_sub(results.len());

        Ok(DocumentResult {
            name: metadata.filename.clone(),
            text,
            pages,
            analysis_text,
            metadata,
        })
    }

    /// Merge and persist. Returns the record with the locations of its artifacts.
    ///
    /// `processing_time_secs` is stamped from `started` once the merge is done,
    /// just before the artifacts are rendered and written.
    pub async fn aggregate(
        &self,
        log_path: &Path,
        metadata: DocumentMetadata,
        analysis_text: String,
        started: Instant,
    ) -> Result<(DocumentResult, ArtifactPaths)> {
        let mut record = self.merge(log_path, metadata, analysis_text).await?;
        record.metadata.processing_time_secs = started.elapsed().as_secs_f64();
        let text = render_text(&record);
        let summary = render_summary(&record);

        let paths = self
            .store
            .save(
                &record.name,
                Artifacts {
                    record: &record,
                    text: &text,
                    summary: &summary,
                },
            )
            .await?;

        info!(
            pages = record.pages.len(),
            chunks_succeeded = record.metadata.chunks_succeeded,
            chunks_failed = record.metadata.chunks_failed,
            "Results aggregated"
        );
        Ok((record, paths))
    }
}

pub fn render_text(record: &DocumentResult) -> String {
    let mut out = String::from("=== OCR Text ===\n");
    out.push_str(&record.text);
    out.push_str("\n\n=== Analysis Text ===\n");
    out.push_str(&record.analysis_text);
    out
}

pub fn render_summary(record: &DocumentResult) -> String {
    let metadata = &record.metadata;
    let analysis = &metadata.analysis;
    let mut out = String::from("=== OCR Processing Summary ===\n");

    // Writing into a String cannot fail.
    let _ = writeln!(out, "\nMetadata:");
    let _ = writeln!(out, "- filename: {}", metadata.filename);
    let _ = writeln!(
        out,
        "- processing_time: {:.1}s",
        metadata.processing_time_secs
    );
    let _ = writeln!(out, "- chunks_total: {}", metadata.chunks_total);
    let _ = writeln!(out, "- chunks_succeeded: {}", metadata.chunks_succeeded);
    let _ = writeln!(out, "- chunks_failed: {}", metadata.chunks_failed);
    let _ = writeln!(out, "- cache_hits: {}", metadata.cache_hits);
    let _ = writeln!(out, "- timed_out: {}", metadata.timed_out);
    let _ = writeln!(out, "- analysis_processed: {}", analysis.processed);
    let _ = writeln!(
        out,
        "- document_type: {}",
        analysis.classifications.document_type
    );
    if let Some(language) = &analysis.classifications.language {
        let _ = writeln!(out, "- language: {language}");
    }

    let _ = write!(out, "\nPages Processed: {}", record.pages.len());
    for page in &record.pages {
        let _ = write!(
            out,
            "\n- Page {}: Confidence {:.2}%",
            page.page_number,
            page.confidence * 100.0
        );
    }

    if !analysis.visual_elements.is_empty() {
        let _ = write!(
            out,
            "\n\nVisual Elements:\n- Detected Objects: {}",
            analysis.visual_elements.objects.len()
        );
    }

    out
}

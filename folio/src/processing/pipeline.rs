use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::analysis::{AnalysisCapability, AnalysisOutcome, AnalysisProvider};
use crate::config::Config;
use crate::error::{FolioError, Result};
use crate::models::{Document, DocumentMetadata, JobStatus, ProcessingResult};
use crate::ocr::{OcrCapability, OcrProvider};
use crate::storage::{ArtifactStore, LocalArtifactStore};

use super::aggregator::ResultAggregator;
use super::cache::ResultCache;
use super::checkpoint::CheckpointLog;
use super::chunk_processor::{ChunkProcessor, ProcessorSettings};
use super::job::{JobState, ProcessingJob};
use super::memory::MemoryGovernor;
use super::splitter::Splitter;

/// Runs whole documents through split, OCR, checkpoint and aggregation.
///
/// Holds no per-job state: every call to [`Orchestrator::process`] gets its own
/// workspace, so jobs may overlap on one instance.
pub struct Orchestrator {
    config: Config,
    splitter: Splitter,
    ocr: Arc<dyn OcrCapability>,
    analysis: Arc<dyn AnalysisCapability>,
    cache: Arc<ResultCache>,
    governor: Arc<MemoryGovernor>,
    aggregator: ResultAggregator,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        ocr: Arc<dyn OcrCapability>,
        analysis: Arc<dyn AnalysisCapability>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        config.validate()?;
        let splitter = Splitter::new(config.split.max_pages_per_chunk)?;
        let cache = Arc::new(ResultCache::from_config(&config.cache));
        let governor = Arc::new(MemoryGovernor::new(&config.memory));

        Ok(Self {
            splitter,
            ocr,
            analysis,
            cache,
            governor,
            aggregator: ResultAggregator::new(store),
            config,
        })
    }

    /// Wire the shipped HTTP capabilities and the local artifact store.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let ocr = OcrProvider::new(&config.ocr);
        if !ocr.is_available() {
            return Err(FolioError::Configuration(
                "OCR capability could not be initialized".to_string(),
            ));
        }
        let analysis = AnalysisProvider::new(&config.analysis);
        let store = LocalArtifactStore::new(&config.job.output_dir)?;

        Self::new(config, Arc::new(ocr), Arc::new(analysis), Arc::new(store))
    }

    pub fn with_governor(mut self, governor: MemoryGovernor) -> Self {
        self.governor = Arc::new(governor);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn process(&self, content: Vec<u8>, name: &str) -> Result<ProcessingResult> {
        let document = Document::new(name, content);
        let mut job = ProcessingJob::create(name, self.config.job.temp_dir.as_deref())?;
        let span = info_span!("job", job_id = %job.id(), document = %name);

        async move {
            info!(size_kb = document.content.len() / 1024, "Starting document processing");
            let outcome = self.run(&mut job, document).await;
            match outcome {
                Ok(result) => {
                    info!(
                        elapsed_secs = job.elapsed().as_secs_f64(),
                        chunks_succeeded = result.metadata.chunks_succeeded,
                        chunks_total = result.metadata.chunks_total,
                        "Document processing completed"
                    );
                    job.finish(JobState::Succeeded);
                    Ok(result)
                }
                Err(e) => {
                    error!(state = %job.state(), error = %e, "Document processing failed");
                    job.finish(JobState::Failed);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, job: &mut ProcessingJob, document: Document) -> Result<ProcessingResult> {
        let log = Arc::new(CheckpointLog::create(job.log_path()).await?);
        self.governor.log_stats("before split").await;

        let analysis = self.spawn_analysis(&document);

        let job_timeout = Duration::from_secs(self.config.job.timeout_secs);
        let deadline = job_deadline(job.started(), job_timeout);

        job.transition(JobState::Splitting)?;
        let (count_rx, chunk_rx, split_task) = self.spawn_splitter(&document);
        let chunks_total = match tokio::time::timeout_at(deadline, count_rx).await {
            Ok(count) => count.map_err(|_| {
                FolioError::Internal("splitter stopped before reporting".to_string())
            })??,
            Err(_) => {
                warn!(
                    timeout_secs = job_timeout.as_secs(),
                    "Job timed out while splitting"
                );
                return Err(FolioError::Aggregation(format!(
                    "job timed out after {job_timeout:?} before any chunk was split"
                )));
            }
        };
        info!(chunks_total, "Document split");

        job.transition(JobState::ProcessingChunks)?;
        let processor = ChunkProcessor::new(
            ProcessorSettings::from(&self.config.ocr),
            Arc::clone(&self.ocr),
            Arc::clone(&self.cache),
            Arc::clone(&self.governor),
        );
        let timed_out = match tokio::time::timeout_at(
            deadline,
            processor.run(chunk_rx, Arc::clone(&log), job.progress()),
        )
        .await
        {
            Ok(outcomes) => {
                debug!(outcomes = outcomes.len(), "Chunk phase finished");
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = job_timeout.as_secs(),
                    "Job timed out, aggregating checkpointed chunks"
                );
                true
            }
        };
        if let Err(e) = split_task.await {
            warn!(error = %e, "Splitter task ended abnormally");
        }
        drop(log);
        self.governor.log_stats("after processing").await;

        let outcome = match analysis.await {
            Ok(outcome) => outcome,
            Err(e) => AnalysisOutcome::Failed(e.to_string()),
        };
        match &outcome {
            AnalysisOutcome::Completed(_) => info!("Secondary analysis completed"),
            AnalysisOutcome::Failed(reason) => warn!(reason = %reason, "Secondary analysis failed"),
            AnalysisOutcome::TimedOut => warn!("Secondary analysis timed out"),
        }
        let (analysis_summary, analysis_text) = outcome.into_parts();

        job.transition(JobState::Aggregating)?;
        let progress = job.progress();
        let metadata = DocumentMetadata {
            filename: job.name().to_string(),
            chunks_total,
            cache_hits: progress.cache_hits(),
            timed_out,
            analysis: analysis_summary,
            ..DocumentMetadata::default()
        };
        let (record, file_paths) = self
            .aggregator
            .aggregate(job.log_path(), metadata, analysis_text, job.started())
            .await?;

        Ok(ProcessingResult {
            status: JobStatus::Success,
            metadata: record.metadata,
            file_paths,
        })
    }

    /// Start the secondary analysis. Dropping the handle cancels it.
    fn spawn_analysis(&self, document: &Document) -> AbortOnDropHandle<AnalysisOutcome> {
        let capability = Arc::clone(&self.analysis);
        let content = Arc::clone(&document.content);
        let name = document.name.clone();
        let limit = Duration::from_secs(self.config.analysis.timeout_secs);

        AbortOnDropHandle::new(tokio::spawn(
            async move {
                match tokio::time::timeout(limit, capability.analyze(&content, &name)).await {
                    Ok(Ok(result)) => AnalysisOutcome::Completed(result),
                    Ok(Err(e)) => AnalysisOutcome::Failed(e.to_string()),
                    Err(_) => AnalysisOutcome::TimedOut,
                }
            }
            .in_current_span(),
        ))
    }

    /// Split on the blocking pool. The chunk count is reported first, then chunks
    /// are rendered one at a time as the dispatcher takes them.
    #[allow(clippy::type_complexity)]
    fn spawn_splitter(
        &self,
        document: &Document,
    ) -> (
        oneshot::Receiver<Result<usize>>,
        mpsc::Receiver<crate::models::Chunk>,
        tokio::task::JoinHandle<()>,
    ) {
        let (count_tx, count_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let splitter = self.splitter;
        let content = Arc::clone(&document.content);
        let span = Span::current();

        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let chunks = match splitter.split(&content) {
                Ok(chunks) => chunks,
                Err(e) => {
                    let _ = count_tx.send(Err(e));
                    return;
                }
            };
            let _ = count_tx.send(Ok(chunks.chunk_count()));

            for chunk in chunks {
                match chunk {
                    Ok(chunk) => {
                        if chunk_tx.blocking_send(chunk).is_err() {
                            debug!("Dispatcher gone, stopping split");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Chunk could not be rendered, skipping"),
                }
            }
        });

        (count_rx, chunk_rx, task)
    }
}

/// The job timeout runs from job creation. A timeout too large to represent
/// never expires.
fn job_deadline(started: std::time::Instant, timeout: Duration) -> Instant {
    let started = Instant::from_std(started);
    started
        .checked_add(timeout)
        .unwrap_or_else(|| started + Duration::from_secs(86400 * 365 * 30))
}

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::OcrConfig;
use crate::error::FolioError;
use crate::models::{Chunk, ChunkOutcome, ChunkResult};
use crate::ocr::OcrCapability;

use super::cache::ResultCache;
use super::checkpoint::CheckpointLog;
use super::job::JobProgress;
use super::memory::MemoryGovernor;

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Upper bound on chunks being worked on, and so on OCR calls in flight.
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl From<&OcrConfig> for ProcessorSettings {
    fn from(config: &OcrConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            attempt_timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Dispatches chunks to the OCR capability: cache first, then bounded retries,
/// then checkpoint.
#[derive(Clone)]
pub struct ChunkProcessor {
    settings: ProcessorSettings,
    ocr: Arc<dyn OcrCapability>,
    cache: Arc<ResultCache>,
    governor: Arc<MemoryGovernor>,
    limiter: Arc<Semaphore>,
}

impl ChunkProcessor {
    pub fn new(
        settings: ProcessorSettings,
        ocr: Arc<dyn OcrCapability>,
        cache: Arc<ResultCache>,
        governor: Arc<MemoryGovernor>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        Self {
            settings,
            ocr,
            cache,
            governor,
            limiter,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Consume chunks until the sender closes and return one outcome per chunk
    /// that was dispatched, ordered by chunk index. Dropping the returned future
    /// aborts every chunk still in flight.
    pub async fn run(
        &self,
        mut chunks: mpsc::Receiver<Chunk>,
        log: Arc<CheckpointLog>,
        progress: Arc<JobProgress>,
    ) -> Vec<ChunkOutcome> {
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();

        while let Some(chunk) = chunks.recv().await {
            self.governor.wait_for_admission().await;

            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                error!("Chunk limiter closed, stopping dispatch");
                break;
            };

            let processor = self.clone();
            let log = Arc::clone(&log);
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = processor.process_chunk(chunk, &log).await;
                processor.record(&outcome, &progress).await;
                outcome
            });

            while let Some(joined) = tasks.try_join_next() {
                collect(joined, &mut outcomes);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut outcomes);
        }

        outcomes.sort_by_key(ChunkOutcome::chunk_index);
        outcomes
    }

    /// Run one chunk to completion. Never fails: errors become `Failed` outcomes.
    pub async fn process_chunk(&self, chunk: Chunk, log: &CheckpointLog) -> ChunkOutcome {
        let index = chunk.index;

        if let Some(cached) = self.cache.get(&chunk.content_hash).await {
            debug!(chunk_index = index, key = %chunk.content_hash, "Serving chunk from cache");
            return checkpoint(log, cached.with_index(index), true, 0).await;
        }

        let mut backoff = self.backoff();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let attempt = tokio::time::timeout(
                self.settings.attempt_timeout,
                self.ocr.recognize(&chunk.content),
            )
            .await
            .unwrap_or_else(|_| Err(FolioError::OcrTimeout(self.settings.attempt_timeout)));

            let error = match attempt {
                Ok(output) => {
                    let result = ChunkResult::new(index, output);
                    self.cache.set(&chunk.content_hash, &result).await;
                    return checkpoint(log, result, false, attempts).await;
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(chunk_index = index, attempt = attempts, error = %error, "Chunk failed permanently");
                return ChunkOutcome::Failed {
                    chunk_index: index,
                    attempts,
                    error: error.to_string(),
                };
            }

            if attempts > self.settings.max_retries {
                warn!(chunk_index = index, attempts, error = %error, "Chunk retries exhausted");
                return ChunkOutcome::Failed {
                    chunk_index: index,
                    attempts,
                    error: error.to_string(),
                };
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.settings.retry_base_delay);
            warn!(
                chunk_index = index,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Chunk attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.retry_base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    async fn record(&self, outcome: &ChunkOutcome, progress: &JobProgress) {
        let completed = match outcome {
            ChunkOutcome::Succeeded { cache_hit, .. } => progress.record_success(*cache_hit),
            ChunkOutcome::Failed { .. } => progress.record_failure(),
        };
        if self.governor.should_log_stats(completed) {
            self.governor.log_stats("chunk progress").await;
        }
    }
}

async fn checkpoint(
    log: &CheckpointLog,
    result: ChunkResult,
    cache_hit: bool,
    attempts: u32,
) -> ChunkOutcome {
    let chunk_index = result.chunk_index;
    match log.append(&result).await {
        Ok(()) => {
            info!(chunk_index, cache_hit, attempts, pages = result.pages.len(), "Chunk done");
            ChunkOutcome::Succeeded {
                chunk_index,
                cache_hit,
                attempts,
            }
        }
        Err(e) => {
            error!(chunk_index, error = %e, "Failed to checkpoint chunk result");
            ChunkOutcome::Failed {
                chunk_index,
                attempts,
                error: e.to_string(),
            }
        }
    }
}

fn collect(joined: Result<ChunkOutcome, tokio::task::JoinError>, outcomes: &mut Vec<ChunkOutcome>) {
    match joined {
        Ok(outcome) => outcomes.push(outcome),
        Err(e) => error!(error = %e, "Chunk task aborted"),
    }
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FolioError, Result};

const LOG_FILE_NAME: &str = "results.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Splitting,
    ProcessingChunks,
    Aggregating,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Forward edges of the job lifecycle. Any non-terminal state may fail.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created, Splitting)
            | (Splitting, ProcessingChunks)
            | (ProcessingChunks, Aggregating)
            | (Aggregating, Succeeded) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::Splitting => "splitting",
            JobState::ProcessingChunks => "processing_chunks",
            JobState::Aggregating => "aggregating",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Chunk counters shared between the dispatcher and its workers.
#[derive(Debug, Default)]
pub struct JobProgress {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl JobProgress {
    pub fn record_success(&self, cache_hit: bool) -> usize {
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.succeeded.fetch_add(1, Ordering::Relaxed) + 1 + self.failed()
    }

    pub fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1 + self.succeeded()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

/// State owned by one `process` call. The private workspace directory, and the
/// checkpoint log inside it, are removed when the job finishes or is dropped.
pub struct ProcessingJob {
    id: Uuid,
    name: String,
    started: Instant,
    state: JobState,
    workspace: Option<TempDir>,
    log_path: PathBuf,
    progress: Arc<JobProgress>,
}

impl ProcessingJob {
    pub fn create(name: impl Into<String>, temp_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("folio_job_");
        let workspace = match temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let log_path = workspace.path().join(LOG_FILE_NAME);

        let id = Uuid::new_v4();
        debug!(job_id = %id, workspace = %workspace.path().display(), "Job workspace created");

        Ok(Self {
            id,
            name: name.into(),
            started: Instant::now(),
            state: JobState::Created,
            workspace: Some(workspace),
            log_path,
            progress: Arc::new(JobProgress::default()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|dir| dir.path())
    }

    pub fn progress(&self) -> Arc<JobProgress> {
        Arc::clone(&self.progress)
    }

    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(FolioError::Internal(format!(
                "invalid job transition {} -> {}",
                self.state, next
            )));
        }
        debug!(job_id = %self.id, from = %self.state, to = %next, "Job state change");
        self.state = next;
        Ok(())
    }

    /// Move to a terminal state and remove the workspace.
    pub fn finish(mut self, terminal: JobState) {
        if let Err(e) = self.transition(terminal) {
            warn!(job_id = %self.id, error = %e, "Finishing job from unexpected state");
            self.state = JobState::Failed;
        }
        if let Some(workspace) = self.workspace.take() {
            if let Err(e) = workspace.close() {
                warn!(job_id = %self.id, error = %e, "Failed to remove job workspace");
            }
        }
    }
}

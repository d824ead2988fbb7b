use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub process_rss_bytes: u64,
    pub process_virtual_bytes: u64,
}

impl MemorySnapshot {
    /// Fraction of system memory in use. An unknown total reads as idle.
    pub fn used_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }
}

pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> MemorySnapshot;
}

/// Samples the host through `sysinfo`.
pub struct SystemSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "Cannot resolve own pid, process memory will read as 0");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SystemSampler {
    fn sample(&self) -> MemorySnapshot {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();

        let mut snapshot = MemorySnapshot {
            total_bytes: system.total_memory(),
            used_bytes: system.used_memory(),
            available_bytes: system.available_memory(),
            ..MemorySnapshot::default()
        };

        if let Some(pid) = self.pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                snapshot.process_rss_bytes = process.memory();
                snapshot.process_virtual_bytes = process.virtual_memory();
            }
        }

        snapshot
    }
}

/// Result of waiting for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { checks: u32 },
    /// Memory stayed above the threshold for every check; the work proceeds anyway.
    Forced { checks: u32 },
}

/// Soft admission control on system memory usage.
#[derive(Clone)]
pub struct MemoryGovernor {
    sampler: Arc<dyn MemorySampler>,
    threshold: f64,
    check_interval: Duration,
    max_checks: u32,
    stats_every: usize,
}

impl MemoryGovernor {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_sampler(config, Arc::new(SystemSampler::new()))
    }

    pub fn with_sampler(config: &MemoryConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        Self {
            sampler,
            threshold: config.threshold,
            check_interval: Duration::from_millis(config.check_interval_ms),
            max_checks: config.max_checks.max(1),
            stats_every: config.stats_every,
        }
    }

    pub fn is_admissible(&self) -> bool {
        self.admits(&self.sampler.sample())
    }

    fn admits(&self, snapshot: &MemorySnapshot) -> bool {
        snapshot.used_fraction() < self.threshold
    }

    /// Take a sample on the blocking pool; refreshing from the OS reads `/proc`.
    /// A sampler that panics reads as idle.
    pub async fn sample(&self) -> MemorySnapshot {
        let sampler = Arc::clone(&self.sampler);
        match tokio::task::spawn_blocking(move || sampler.sample()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Memory sampling failed");
                MemorySnapshot::default()
            }
        }
    }

    pub async fn wait_for_admission(&self) -> Admission {
        for check in 1..=self.max_checks {
            if self.admits(&self.sample().await) {
                return Admission::Admitted { checks: check };
            }
            if check < self.max_checks {
                debug!(check, "Memory above threshold, waiting");
                tokio::time::sleep(self.check_interval).await;
            }
        }

        warn!(
            checks = self.max_checks,
            threshold = self.threshold,
            "Memory still above threshold, proceeding anyway"
        );
        Admission::Forced {
            checks: self.max_checks,
        }
    }

    /// Whether stats should be logged after `completed` chunks. Zero disables.
    pub fn should_log_stats(&self, completed: usize) -> bool {
        self.stats_every > 0 && completed > 0 && completed % self.stats_every == 0
    }

    pub async fn log_stats(&self, context: &str) {
        let snapshot = self.sample().await;
        info!(
            context,
            process_rss_mb = snapshot.process_rss_bytes / MB,
            process_virtual_mb = snapshot.process_virtual_bytes / MB,
            system_used_percent = (snapshot.used_fraction() * 1000.0).round() / 10.0,
            available_mb = snapshot.available_bytes / MB,
            "Memory stats"
        );
    }
}

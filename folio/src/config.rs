use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::error::{FolioError, Result};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub split: SplitConfig,
    pub ocr: OcrConfig,
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    pub max_pages_per_chunk: u32,
}

/// Primary OCR capability: a Document AI style `:process` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Fully qualified processor resource name, e.g.
    /// `projects/p/locations/eu/processors/abc123`.
    pub processor_name: Option<String>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Fraction of system memory in use above which new chunks wait.
    pub threshold: f64,
    pub check_interval_ms: u64,
    pub max_checks: u32,
    /// Log memory statistics every N completed chunks.
    pub stats_every: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub output_dir: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            processor_name: None,
            base_url: "https://documentai.googleapis.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            concurrency: 3,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://vision.googleapis.com/v1".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            check_interval_ms: 500,
            max_checks: 10,
            stats_every: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let ocr_defaults = OcrConfig::default();
        let analysis_defaults = AnalysisConfig::default();
        let memory_defaults = MemoryConfig::default();

        Self {
            split: SplitConfig {
                max_pages_per_chunk: parse_env_or("SPLIT_MAX_PAGES", 10),
            },
            ocr: OcrConfig {
                processor_name: parse_env_opt("OCR_PROCESSOR_NAME"),
                base_url: env::var("OCR_BASE_URL").unwrap_or(ocr_defaults.base_url),
                api_key: env::var("OCR_API_KEY").ok(),
                timeout_secs: parse_env_or("OCR_TIMEOUT", ocr_defaults.timeout_secs),
                max_retries: parse_env_or("OCR_MAX_RETRIES", ocr_defaults.max_retries),
                retry_base_delay_ms: parse_env_or(
                    "OCR_RETRY_BASE_DELAY_MS",
                    ocr_defaults.retry_base_delay_ms,
                ),
                concurrency: parse_env_or("OCR_CONCURRENCY", ocr_defaults.concurrency),
            },
            analysis: AnalysisConfig {
                enabled: parse_env_or("ANALYSIS_ENABLED", analysis_defaults.enabled),
                base_url: env::var("ANALYSIS_BASE_URL").unwrap_or(analysis_defaults.base_url),
                api_key: env::var("ANALYSIS_API_KEY").ok(),
                timeout_secs: parse_env_or("ANALYSIS_TIMEOUT", analysis_defaults.timeout_secs),
            },
            cache: CacheConfig {
                dir: parse_env_opt("CACHE_DIR")
                    .unwrap_or_else(|| env::temp_dir().join("ocr_cache")),
                ttl_hours: parse_env_or("CACHE_TTL_HOURS", 24),
            },
            memory: MemoryConfig {
                threshold: parse_env_or("MEMORY_THRESHOLD", memory_defaults.threshold),
                check_interval_ms: parse_env_or(
                    "MEMORY_CHECK_INTERVAL_MS",
                    memory_defaults.check_interval_ms,
                ),
                max_checks: parse_env_or("MEMORY_MAX_CHECKS", memory_defaults.max_checks),
                stats_every: parse_env_or("MEMORY_STATS_EVERY", memory_defaults.stats_every),
            },
            job: JobConfig {
                output_dir: parse_env_opt("OUTPUT_DIR")
                    .unwrap_or_else(|| PathBuf::from("documents")),
                temp_dir: parse_env_opt("TEMP_DIR"),
                timeout_secs: parse_env_or("JOB_TIMEOUT", 3600),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Reject configurations no job could run with. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        match self.ocr.processor_name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => {
                return Err(FolioError::Configuration(
                    "OCR_PROCESSOR_NAME is required".to_string(),
                ))
            }
        }

        if self.split.max_pages_per_chunk == 0 {
            return Err(FolioError::Configuration(
                "SPLIT_MAX_PAGES must be at least 1".to_string(),
            ));
        }

        if self.ocr.concurrency == 0 {
            return Err(FolioError::Configuration(
                "OCR_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if !(self.memory.threshold > 0.0 && self.memory.threshold <= 1.0) {
            return Err(FolioError::Configuration(format!(
                "MEMORY_THRESHOLD must be within (0, 1], got {}",
                self.memory.threshold
            )));
        }

        Ok(())
    }
}

// Common test utilities for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};

use folio::analysis::AnalysisCapability;
use folio::config::Config;
use folio::error::{FolioError, Result};
use folio::models::{AnalysisResult, OcrOutput, PageRecord};
use folio::ocr::OcrCapability;
use folio::processing::Orchestrator;
use folio::storage::LocalArtifactStore;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A PDF of `pages` pages, each drawing the text `Page {n}`.
pub fn build_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for number in 1..=pages {
        let content = format!("BT /F1 24 Tf 72 720 Td (Page {number}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Source page numbers drawn on each page of a chunk, in page order.
pub fn page_labels(chunk_bytes: &[u8]) -> Vec<u32> {
    let doc = Document::load_mem(chunk_bytes).unwrap();
    doc.get_pages()
        .values()
        .filter_map(|page_id| {
            let content = doc.get_page_content(*page_id).ok()?;
            let text = String::from_utf8_lossy(&content);
            let start = text.find("(Page ")? + "(Page ".len();
            let end = start + text[start..].find(')')?;
            text[start..end].parse().ok()
        })
        .collect()
}

/// OCR stand-in that reads the page labels back out of each chunk.
///
/// Chunks are identified by their first source page. Pages listed in
/// `rejected` fail permanently; pages in `transient` fail that many times with a
/// retryable error before succeeding.
#[derive(Default)]
pub struct ScriptedOcr {
    rejected: HashSet<u32>,
    transient: Mutex<HashMap<u32, u32>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, first_page: u32) -> Self {
        self.rejected.insert(first_page);
        self
    }

    pub fn flaky(self, first_page: u32, failures: u32) -> Self {
        self.transient.lock().unwrap().insert(first_page, failures);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrCapability for ScriptedOcr {
    async fn recognize(&self, chunk_bytes: &[u8]) -> Result<OcrOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let labels = page_labels(chunk_bytes);
        let first_page = labels.first().copied().unwrap_or(0);

        if self.rejected.contains(&first_page) {
            return Err(FolioError::OcrRejected("400 unsupported document".to_string()));
        }
        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(&first_page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FolioError::Ocr("503 Service Unavailable".to_string()));
                }
            }
        }

        Ok(OcrOutput {
            text: labels
                .iter()
                .map(|n| format!("Page {n}\n"))
                .collect(),
            pages: (1..=labels.len() as u32)
                .map(|page_number| PageRecord {
                    page_number,
                    width: 612.0,
                    height: 792.0,
                    confidence: 0.98,
                })
                .collect(),
        })
    }
}

pub enum MockAnalysis {
    Completes(AnalysisResult),
    Fails,
    Hangs,
}

#[async_trait]
impl AnalysisCapability for MockAnalysis {
    async fn analyze(&self, _content: &[u8], _name: &str) -> Result<AnalysisResult> {
        match self {
            MockAnalysis::Completes(result) => Ok(result.clone()),
            MockAnalysis::Fails => Err(FolioError::Analysis("quota exceeded".to_string())),
            MockAnalysis::Hangs => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(AnalysisResult::default())
            }
        }
    }
}

/// Fast settings rooted in `root`, independent of the environment the tests run in.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.split.max_pages_per_chunk = 10;
    config.ocr.processor_name = Some("projects/test/locations/us/processors/mock".to_string());
    config.ocr.timeout_secs = 5;
    config.ocr.max_retries = 3;
    config.ocr.retry_base_delay_ms = 1;
    config.ocr.concurrency = 3;
    config.analysis.timeout_secs = 5;
    config.cache.dir = root.join("cache");
    config.cache.ttl_hours = 24;
    config.memory.threshold = 1.0;
    config.memory.stats_every = 1;
    config.job.output_dir = root.join("out");
    config.job.temp_dir = Some(root.join("jobs"));
    config.job.timeout_secs = 60;
    config
}

pub fn orchestrator(
    config: Config,
    ocr: Arc<ScriptedOcr>,
    analysis: MockAnalysis,
) -> Orchestrator {
    let store = LocalArtifactStore::new(&config.job.output_dir).unwrap();
    Orchestrator::new(config, ocr, Arc::new(analysis), Arc::new(store)).unwrap()
}

/// Number of job workspaces left under the configured temp root.
pub fn leftover_workspaces(config: &Config) -> usize {
    config
        .job
        .temp_dir
        .as_ref()
        .and_then(|dir| std::fs::read_dir(dir).ok())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

// Re-export commonly used crates for convenience
pub use serial_test::serial;
pub use tempfile;
pub use wiremock;

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{
    build_pdf, init_test_logger, leftover_workspaces, orchestrator, tempfile::TempDir,
    test_config, MockAnalysis, ScriptedOcr,
};
use folio::error::FolioError;
use folio::models::{
    AnalysisResult, Classifications, DocumentResult, JobStatus, Label, VisualElements,
};
use folio::processing::CheckpointLog;

fn read_record(path: &std::path::Path) -> DocumentResult {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_45_pages_merge_into_contiguous_pages() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config.clone(), ocr.clone(), MockAnalysis::Fails);

    let result = orchestrator
        .process(build_pdf(45), "manual.pdf")
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.metadata.chunks_total, 5);
    assert_eq!(result.metadata.chunks_succeeded, 5);
    assert_eq!(result.metadata.chunks_failed, 0);
    assert!(!result.metadata.timed_out);
    assert_eq!(ocr.calls(), 5);

    let record = read_record(&result.file_paths.json);
    let numbers: Vec<u32> = record.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, (1..=45).collect::<Vec<u32>>());

    let expected: String = (1..=45).map(|n| format!("Page {n}\n")).collect();
    assert_eq!(record.text, expected);
    assert_eq!(leftover_workspaces(&config), 0);
}

#[tokio::test]
async fn test_one_permanently_failing_chunk() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new().rejecting(21));
    let orchestrator = orchestrator(config, ocr.clone(), MockAnalysis::Fails);

    let result = orchestrator
        .process(build_pdf(50), "report.pdf")
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.metadata.chunks_total, 5);
    assert_eq!(result.metadata.chunks_succeeded, 4);
    assert_eq!(result.metadata.chunks_failed, 1);
    // Rejections are not retried.
    assert_eq!(ocr.calls(), 5);

    let record = read_record(&result.file_paths.json);
    assert_eq!(record.pages.len(), 40);
    assert!(!record.text.contains("Page 21\n"));
    assert!(!record.text.contains("Page 30\n"));
    assert!(record.text.contains("Page 31\n"));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let max_retries = config.ocr.max_retries;
    let ocr = Arc::new(ScriptedOcr::new().flaky(11, max_retries - 1));
    let orchestrator = orchestrator(config, ocr.clone(), MockAnalysis::Fails);

    let result = orchestrator
        .process(build_pdf(25), "flaky.pdf")
        .await
        .unwrap();

    assert_eq!(result.metadata.chunks_succeeded, 3);
    assert_eq!(result.metadata.chunks_failed, 0);
    assert_eq!(ocr.calls(), 3 + (max_retries as usize - 1));
}

#[tokio::test]
async fn test_all_chunks_failing_is_aggregation_error() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new().rejecting(1).rejecting(11));
    let orchestrator = orchestrator(config.clone(), ocr, MockAnalysis::Fails);

    let result = orchestrator.process(build_pdf(20), "broken.pdf").await;

    assert!(matches!(result, Err(FolioError::Aggregation(_))));
    assert_eq!(leftover_workspaces(&config), 0);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.ocr.concurrency = 2;
    config.split.max_pages_per_chunk = 2;
    let ocr = Arc::new(ScriptedOcr::new().with_delay(Duration::from_millis(30)));
    let orchestrator = orchestrator(config, ocr.clone(), MockAnalysis::Fails);

    let result = orchestrator
        .process(build_pdf(16), "wide.pdf")
        .await
        .unwrap();

    assert_eq!(result.metadata.chunks_succeeded, 8);
    assert!(ocr.max_in_flight() <= 2);
    assert!(ocr.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_second_job_over_same_content_hits_cache() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config, ocr.clone(), MockAnalysis::Fails);
    let source = build_pdf(30);

    let first = orchestrator
        .process(source.clone(), "first.pdf")
        .await
        .unwrap();
    assert_eq!(first.metadata.cache_hits, 0);
    assert_eq!(ocr.calls(), 3);

    let second = orchestrator.process(source, "second.pdf").await.unwrap();
    assert_eq!(second.metadata.cache_hits, 3);
    assert_eq!(second.metadata.chunks_succeeded, 3);
    assert_eq!(ocr.calls(), 3);

    let a = read_record(&first.file_paths.json);
    let b = read_record(&second.file_paths.json);
    assert_eq!(a.text, b.text);
    assert_eq!(a.pages, b.pages);
}

#[tokio::test]
async fn test_analysis_timeout_degrades_metadata_only() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.analysis.timeout_secs = 1;
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config, ocr, MockAnalysis::Hangs);

    let result = orchestrator
        .process(build_pdf(12), "slow.pdf")
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert!(!result.metadata.analysis.processed);
    assert!(result.metadata.analysis.labels.is_empty());
    assert!(result.metadata.analysis.visual_elements.is_empty());
    assert_eq!(result.metadata.chunks_succeeded, 2);
}

#[tokio::test]
async fn test_analysis_result_lands_in_metadata_and_text() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let analysis = AnalysisResult {
        text: "Installation guide".to_string(),
        labels: vec![Label {
            description: "Document".to_string(),
            score: 0.97,
            topicality: 0.97,
        }],
        visual_elements: VisualElements::default(),
        classifications: Classifications {
            language: Some("en".to_string()),
            ..Classifications::default()
        },
        confidence: 0.9,
    };
    let orchestrator = orchestrator(
        config,
        Arc::new(ScriptedOcr::new()),
        MockAnalysis::Completes(analysis),
    );

    let result = orchestrator
        .process(build_pdf(3), "guide.pdf")
        .await
        .unwrap();

    let summary = &result.metadata.analysis;
    assert!(summary.processed);
    assert_eq!(summary.labels.len(), 1);
    assert_eq!(summary.classifications.language.as_deref(), Some("en"));

    let text = std::fs::read_to_string(&result.file_paths.text).unwrap();
    assert!(text.starts_with("=== OCR Text ===\nPage 1\n"));
    assert!(text.ends_with("=== Analysis Text ===\nInstallation guide"));

    let summary_text = std::fs::read_to_string(&result.file_paths.summary).unwrap();
    assert!(summary_text.contains("Pages Processed: 3"));
    assert!(summary_text.contains("- Page 3: Confidence 98.00%"));
}

#[tokio::test]
async fn test_job_timeout_aggregates_checkpointed_chunks() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.job.timeout_secs = 1;
    config.ocr.concurrency = 1;
    config.split.max_pages_per_chunk = 1;
    let ocr = Arc::new(ScriptedOcr::new().with_delay(Duration::from_millis(300)));
    let orchestrator = orchestrator(config.clone(), ocr, MockAnalysis::Fails);

    let result = orchestrator
        .process(build_pdf(8), "long.pdf")
        .await
        .unwrap();

    assert!(result.metadata.timed_out);
    assert_eq!(result.metadata.chunks_total, 8);
    assert!(result.metadata.chunks_succeeded >= 1);
    assert!(result.metadata.chunks_succeeded < 8);
    assert_eq!(
        result.metadata.chunks_failed,
        8 - result.metadata.chunks_succeeded
    );
    assert_eq!(leftover_workspaces(&config), 0);
}

#[tokio::test]
async fn test_job_timeout_covers_split_phase() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.job.timeout_secs = 0;
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config.clone(), ocr.clone(), MockAnalysis::Hangs);

    let result = orchestrator.process(build_pdf(3000), "huge.pdf").await;

    match result {
        Err(FolioError::Aggregation(message)) => assert!(message.contains("timed out")),
        other => panic!("expected a split-phase timeout, got {other:?}"),
    }
    assert_eq!(ocr.calls(), 0);
    assert_eq!(leftover_workspaces(&config), 0);
}

#[tokio::test]
async fn test_not_a_pdf_is_format_error() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config.clone(), ocr.clone(), MockAnalysis::Fails);

    let result = orchestrator
        .process(b"GIF89a not a document".to_vec(), "image.pdf")
        .await;

    assert!(matches!(result, Err(FolioError::DocumentFormat(_))));
    assert_eq!(ocr.calls(), 0);
    assert_eq!(leftover_workspaces(&config), 0);
}

#[tokio::test]
async fn test_recovery_after_partial_checkpoint() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let ocr = Arc::new(ScriptedOcr::new());
    let orchestrator = orchestrator(config, ocr, MockAnalysis::Fails);

    let full = orchestrator
        .process(build_pdf(50), "crash.pdf")
        .await
        .unwrap();
    let record = read_record(&full.file_paths.json);
    assert_eq!(record.metadata.chunks_succeeded, 5);

    // Replay three of the five chunk results into a fresh log, then tear the tail
    // as a crash mid-append would.
    let log_path = dir.path().join("partial.jsonl");
    let log = CheckpointLog::create(&log_path).await.unwrap();
    let cache = orchestrator.cache();
    let chunks: Vec<_> = folio::processing::Splitter::new(10)
        .unwrap()
        .split(&build_pdf(50))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    for index in [4, 0, 2] {
        let cached = cache.get(&chunks[index].content_hash).await.unwrap();
        log.append(&cached.with_index(index)).await.unwrap();
    }
    drop(log);
    let mut raw = std::fs::read(&log_path).unwrap();
    raw.extend_from_slice(b"{\"chunk_index\":1,\"te");
    std::fs::write(&log_path, raw).unwrap();

    let recovered = CheckpointLog::recover(&log_path).await.unwrap();
    let indices: Vec<usize> = recovered.iter().map(|r| r.chunk_index).collect();
    assert_eq!(indices, vec![0, 2, 4]);
    assert_eq!(recovered[1].text, (21..=30).map(|n| format!("Page {n}\n")).collect::<String>());
}

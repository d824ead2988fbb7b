mod common;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use folio::config::OcrConfig;
use folio::error::FolioError;
use folio::ocr::{DocumentAiClient, OcrCapability, OcrProvider};

const PROCESSOR: &str = "projects/test/locations/us/processors/abc";

fn ocr_config(base_url: String) -> OcrConfig {
    OcrConfig {
        processor_name: Some(PROCESSOR.to_string()),
        base_url,
        api_key: Some("test-key".to_string()),
        timeout_secs: 5,
        ..OcrConfig::default()
    }
}

#[tokio::test]
async fn test_process_parses_document() {
    common::init_test_logger();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/{PROCESSOR}:process")))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "rawDocument": {"mimeType": "application/pdf"},
            "skipHumanReview": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": {
                "text": "Section 1\nSection 2\n",
                "pages": [
                    {
                        "pageNumber": 1,
                        "dimension": {"width": 612.0, "height": 792.0},
                        "layout": {"confidence": 0.97}
                    },
                    {
                        "pageNumber": 2,
                        "dimension": {"width": 612.0, "height": 792.0},
                        "layout": {"confidence": 0.91}
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DocumentAiClient::new(&ocr_config(server.uri())).unwrap();
    let output = client.process(b"%PDF-1.5 chunk").await.unwrap();

    assert_eq!(output.text, "Section 1\nSection 2\n");
    assert_eq!(output.pages.len(), 2);
    assert_eq!(output.pages[1].page_number, 2);
    assert!((output.pages[1].confidence - 0.91).abs() < 1e-6);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let provider = OcrProvider::new(&ocr_config(server.uri()));
    let error = provider.recognize(b"%PDF-1.5").await.unwrap_err();

    assert!(matches!(error, FolioError::Ocr(_)));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_bad_request_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid document"))
        .mount(&server)
        .await;

    let provider = OcrProvider::new(&ocr_config(server.uri()));
    let error = provider.recognize(b"%PDF-1.5").await.unwrap_err();

    assert!(matches!(error, FolioError::OcrRejected(_)));
    assert!(!error.is_transient());
    assert!(error.to_string().contains("invalid document"));
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = DocumentAiClient::new(&ocr_config(server.uri())).unwrap();
    assert!(client.process(b"%PDF-1.5").await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let client = DocumentAiClient::new(&ocr_config(server.uri())).unwrap();
    let error = client.process(b"%PDF-1.5").await.unwrap_err();
    assert!(matches!(error, FolioError::Ocr(_)));
}

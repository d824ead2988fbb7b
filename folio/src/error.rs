use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Document format error: {0}")]
    DocumentFormat(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR request timed out after {0:?}")]
    OcrTimeout(Duration),

    #[error("OCR request rejected: {0}")]
    OcrRejected(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FolioError {
    /// Whether a chunk attempt that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            FolioError::Ocr(_) | FolioError::OcrTimeout(_) => true,
            FolioError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;

//! Secondary, best-effort document analysis (labels, objects, language).
//!
//! Runs alongside chunk OCR. Whatever happens here only changes document metadata:
//! an error, a timeout or a missing backend all end up as an empty
//! [`AnalysisSummary`](crate::models::AnalysisSummary).

mod api;
mod provider;

pub use api::VisionClient;
pub use provider::{AnalysisCapability, AnalysisOutcome, AnalysisProvider};

//! Primary OCR capability.
//!
//! The pipeline only depends on the [`OcrCapability`] trait; [`OcrProvider`] is the
//! production implementation and follows the same backend pattern as the analysis
//! module:
//! - `Api` wraps a Document AI style HTTP client (`DocumentAiClient`)
//! - `Unavailable` records why no backend could be built and fails every call
//!
//! Retries and per-attempt timeouts are applied by the chunk processor, not here,
//! so every implementation gets the same policy.

mod api;
mod provider;

pub use api::DocumentAiClient;
pub use provider::{OcrCapability, OcrProvider};

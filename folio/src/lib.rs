pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod ocr;
pub mod processing;
pub mod storage;

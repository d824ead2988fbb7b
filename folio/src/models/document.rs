use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Source document for one job. The bytes are shared, never copied, between the
/// splitter and the secondary analysis.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub content: Arc<[u8]>,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A contiguous page range rendered as a standalone sub-document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Ordinal position of the chunk within its document, starting at 0.
    pub index: usize,
    /// 1-based page number of the first source page in this chunk.
    pub first_page: u32,
    pub page_count: u32,
    pub content: Vec<u8>,
    pub content_hash: String,
}

impl Chunk {
    pub fn new(index: usize, first_page: u32, page_count: u32, content: Vec<u8>) -> Self {
        let content_hash = content_hash(&content);
        Self {
            index,
            first_page,
            page_count,
            content,
            content_hash,
        }
    }
}

/// Hex SHA-256 of raw bytes. The cache identity of a chunk.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{digest:x}")
}

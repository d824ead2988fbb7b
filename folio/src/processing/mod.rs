//! The chunked OCR pipeline: split, dispatch with cache and retry, checkpoint,
//! aggregate.

mod aggregator;
mod cache;
mod checkpoint;
mod chunk_processor;
mod job;
mod memory;
mod pipeline;
mod splitter;

pub use aggregator::{render_summary, render_text, ResultAggregator};
pub use cache::ResultCache;
pub use checkpoint::CheckpointLog;
pub use chunk_processor::{ChunkProcessor, ProcessorSettings};
pub use job::{JobProgress, JobState, ProcessingJob};
pub use memory::{Admission, MemoryGovernor, MemorySampler, MemorySnapshot, SystemSampler};
pub use pipeline::Orchestrator;
pub use splitter::{PageChunks, Splitter};

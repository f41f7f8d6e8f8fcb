//! Chunked FIFO queue (L3) plus the thread-safe message queue (C2) built on
//! top of it.

pub mod chunk;
pub mod counter;
pub mod mpmc;

pub use chunk::{ChunkQueue, DEFAULT_CHUNK_CAP};
pub use counter::EventCounter;
pub use mpmc::MessageQueue;

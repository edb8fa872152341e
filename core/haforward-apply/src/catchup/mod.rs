//! Bounded consistency repair for lost forwarded messages.

mod checkpoint;
mod scheduler;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use scheduler::{AutoReindexScheduler, ScanReport};

//! Durable storage for the post retry queue

pub mod queue_store;

pub use queue_store::{JsonQueueStore, MemoryQueueStore};

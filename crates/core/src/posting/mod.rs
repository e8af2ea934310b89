//! Posting: validation, the retry queue and its ports

pub mod ports;
pub mod queue;
pub mod validation;

pub use ports::{ApiResponse, PostDeliverer, PostingApi, QueueStore};
pub use queue::{DrainReport, Enqueued, PostQueue};
pub use validation::validate_post_text;

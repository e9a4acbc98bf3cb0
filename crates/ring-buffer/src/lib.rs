//! Bounded Ring Buffer
//!
//! Provides a fixed-capacity, blocking FIFO used to hand vehicle snapshots
//! from the feed producer to the store consumer.

mod buffer;

pub use buffer::{BoundedQueue, DEFAULT_CAPACITY};

use thiserror::Error;

/// Queue construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,
}

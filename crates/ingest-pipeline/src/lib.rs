//! Vehicle Position Ingest Pipeline
//!
//! Decouples feed acquisition from persistence: a producer thread polls and
//! decodes the feed into a bounded queue, a consumer thread drains the queue
//! into the store in batches. Shutdown is a single signal on the queue; the
//! producer stops pushing and the consumer drains what is left before it
//! exits.

mod config;
mod consumer;
mod pipeline;
mod producer;
mod shutdown;

pub use config::PipelineConfig;
pub use consumer::{Consumer, ConsumerStats};
pub use pipeline::{Pipeline, PipelineReport, RunningPipeline};
pub use producer::{Producer, ProducerStats};
pub use shutdown::ShutdownCoordinator;

use ring_buffer::QueueError;
use thiserror::Error;

/// Pipeline setup and teardown errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Queue construction failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to spawn {worker} thread: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

//! Pipeline Wiring
//!
//! Owns the hand-off queue, runs the producer and consumer on dedicated OS
//! threads and joins both before the queue is released.

use crate::config::PipelineConfig;
use crate::consumer::{Consumer, ConsumerStats};
use crate::producer::{Producer, ProducerStats};
use crate::shutdown::ShutdownCoordinator;
use crate::PipelineError;
use gtfs_feed::{FeedDecoder, FeedSource, VehicleSnapshot};
use ring_buffer::BoundedQueue;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use storage::SnapshotStore;
use tracing::{error, info};

/// Worker statistics collected at join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub producer: ProducerStats,
    pub consumer: ConsumerStats,
}

/// A configured, not yet running pipeline
pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<BoundedQueue<VehicleSnapshot>>,
    coordinator: ShutdownCoordinator,
}

impl Pipeline {
    /// Validate the configuration and allocate the queue.
    ///
    /// This is where fatal setup errors surface; no thread exists yet.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity)?);
        let coordinator = ShutdownCoordinator::new(Arc::clone(&queue));

        info!(
            "Pipeline configured: capacity {}, batch size {}",
            config.queue_capacity, config.batch_size
        );
        Ok(Self {
            config,
            queue,
            coordinator,
        })
    }

    /// Shutdown handle, usable before and after `start`
    pub fn coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// Spawn the producer and consumer threads
    pub fn start<S, D, St>(
        self,
        source: S,
        decoder: D,
        store: St,
    ) -> Result<RunningPipeline, PipelineError>
    where
        S: FeedSource + 'static,
        D: FeedDecoder + 'static,
        St: SnapshotStore + 'static,
    {
        let producer = Producer::new(source, decoder, Arc::clone(&self.queue), &self.config);
        let consumer = Consumer::new(store, Arc::clone(&self.queue), &self.config);

        let producer = spawn_worker("producer", self.coordinator.clone(), move || producer.run())?;

        let consumer = spawn_worker("consumer", self.coordinator.clone(), move || consumer.run());
        let consumer = match consumer {
            Ok(handle) => handle,
            Err(e) => {
                self.coordinator.trigger();
                let _ = producer.join();
                return Err(e);
            }
        };

        info!("Pipeline started");
        Ok(RunningPipeline {
            queue: self.queue,
            coordinator: self.coordinator,
            producer,
            consumer,
        })
    }
}

/// Handle to the two running workers
pub struct RunningPipeline {
    queue: Arc<BoundedQueue<VehicleSnapshot>>,
    coordinator: ShutdownCoordinator,
    producer: JoinHandle<ProducerStats>,
    consumer: JoinHandle<ConsumerStats>,
}

impl RunningPipeline {
    /// Shutdown handle for signal handlers and other stop sources
    pub fn coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// Snapshots currently waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Wait for both workers, then release the queue.
    ///
    /// Blocks until shutdown has been triggered and the consumer has drained
    /// the queue.
    pub fn join(self) -> Result<PipelineReport, PipelineError> {
        let producer = self.producer.join().map_err(|_| {
            error!("Producer thread panicked");
            PipelineError::WorkerPanicked("producer")
        });
        let consumer = self.consumer.join().map_err(|_| {
            error!("Consumer thread panicked");
            PipelineError::WorkerPanicked("consumer")
        });

        let left = self.queue.len();
        drop(self.queue);
        info!("Both workers stopped, queue released ({} items left)", left);

        Ok(PipelineReport {
            producer: producer?,
            consumer: consumer?,
        })
    }
}

/// Triggers shutdown if the worker thread unwinds, so its counterpart is not
/// left blocked on the queue forever.
struct ShutdownOnPanic {
    worker: &'static str,
    coordinator: ShutdownCoordinator,
}

impl Drop for ShutdownOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("{} thread panicked, stopping pipeline", self.worker);
            self.coordinator.trigger();
        }
    }
}

fn spawn_worker<F, R>(
    name: &'static str,
    coordinator: ShutdownCoordinator,
    work: F,
) -> Result<JoinHandle<R>, PipelineError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = ShutdownOnPanic {
                worker: name,
                coordinator,
            };
            work()
        })
        .map_err(|e| PipelineError::Spawn { worker: name, source: e })
}

//! Consumer Worker
//!
//! Drains the hand-off queue into the store in fixed-size batches. Every
//! snapshot the consumer pops is written into a batch that gets committed,
//! including the partial batch left when shutdown empties the queue.

use crate::config::PipelineConfig;
use gtfs_feed::VehicleSnapshot;
use ring_buffer::BoundedQueue;
use std::sync::Arc;
use storage::SnapshotStore;
use tracing::{debug, error, info, warn};

/// Counters reported when the consumer exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Snapshots taken off the queue
    pub popped: u64,
    /// Snapshots accepted by the store
    pub written: u64,
    pub write_failures: u64,
    /// Successful commits
    pub commits: u64,
    /// Records covered by successful commits
    pub committed: u64,
    pub commit_failures: u64,
}

/// Store writing worker
pub struct Consumer<St> {
    store: St,
    queue: Arc<BoundedQueue<VehicleSnapshot>>,
    batch_size: usize,
}

impl<St: SnapshotStore> Consumer<St> {
    /// Create a new consumer
    pub fn new(
        store: St,
        queue: Arc<BoundedQueue<VehicleSnapshot>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            batch_size: config.batch_size,
        }
    }

    /// Run until the queue is shut down and drained
    pub fn run(mut self) -> ConsumerStats {
        info!("Starting consumer (batch size {})", self.batch_size);
        let mut stats = ConsumerStats::default();
        let mut batch_open = self.open_batch();
        let mut batch_len = 0usize;

        while let Some(snapshot) = self.queue.pop() {
            stats.popped += 1;

            // Items still draining after a shutdown-time commit need a batch too
            if !batch_open {
                batch_open = self.open_batch();
            }

            match self.store.write(&snapshot) {
                Ok(()) => stats.written += 1,
                Err(e) => {
                    stats.write_failures += 1;
                    metrics::counter!("ingest_write_failures_total").increment(1);
                    warn!(
                        "Skipping snapshot for vehicle {}: {}",
                        snapshot.fleet_number, e
                    );
                }
            }
            batch_len += 1;

            if batch_len >= self.batch_size {
                self.commit(batch_len, &mut stats);
                batch_len = 0;
                batch_open = false;

                if !self.queue.is_shutdown() {
                    batch_open = self.open_batch();
                }
            }
        }

        if batch_len > 0 {
            debug!("Flushing final partial batch of {}", batch_len);
            self.commit(batch_len, &mut stats);
        }

        info!(
            "Consumer stopped: {} popped, {} committed in {} batches, {} write failures",
            stats.popped, stats.committed, stats.commits, stats.write_failures
        );
        stats
    }

    fn open_batch(&mut self) -> bool {
        match self.store.open_batch() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to open batch: {}", e);
                false
            }
        }
    }

    fn commit(&mut self, batch_len: usize, stats: &mut ConsumerStats) {
        match self.store.commit_batch() {
            Ok(committed) => {
                stats.commits += 1;
                stats.committed += committed as u64;
                metrics::counter!("ingest_snapshots_committed_total").increment(committed as u64);
                debug!("Committed {} of {} batched snapshots", committed, batch_len);
            }
            Err(e) => {
                stats.commit_failures += 1;
                metrics::counter!("ingest_commit_failures_total").increment(1);
                error!("Commit of {} snapshots failed: {}", batch_len, e);
            }
        }
        metrics::gauge!("ingest_queue_depth").set(self.queue.len() as f64);
    }
}

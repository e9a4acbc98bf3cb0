//! Producer Worker
//!
//! Polls the feed, decodes each payload and pushes snapshots with a usable
//! position into the hand-off queue.

use crate::config::PipelineConfig;
use gtfs_feed::{FeedDecoder, FeedSource, VehicleSnapshot};
use ring_buffer::BoundedQueue;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters reported when the producer exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Fetch attempts
    pub polls: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    /// Snapshots accepted by the queue
    pub pushed: u64,
    /// Snapshots dropped for missing or invalid position data
    pub filtered: u64,
    /// Snapshots refused by the queue because of shutdown
    pub rejected: u64,
}

/// Feed polling worker
pub struct Producer<S, D> {
    source: S,
    decoder: D,
    queue: Arc<BoundedQueue<VehicleSnapshot>>,
    poll_interval: Duration,
    retry_backoff: Duration,
    shutdown_check: Duration,
    /// Failed cycles since the last successful one
    consecutive_failures: u32,
}

impl<S: FeedSource, D: FeedDecoder> Producer<S, D> {
    /// Create a new producer
    pub fn new(
        source: S,
        decoder: D,
        queue: Arc<BoundedQueue<VehicleSnapshot>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            source,
            decoder,
            queue,
            poll_interval: config.poll_interval(),
            retry_backoff: config.retry_backoff(),
            shutdown_check: config.shutdown_check(),
            consecutive_failures: 0,
        }
    }

    /// Run the polling loop until shutdown is observed
    pub fn run(mut self) -> ProducerStats {
        info!(
            "Starting producer (poll every {:?}, backoff {:?})",
            self.poll_interval, self.retry_backoff
        );
        let mut stats = ProducerStats::default();

        while !self.queue.is_shutdown() {
            stats.polls += 1;

            let bytes = match self.source.fetch() {
                Ok(bytes) => bytes,
                Err(e) => {
                    stats.fetch_failures += 1;
                    metrics::counter!("ingest_fetch_failures_total").increment(1);
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    warn!(
                        "Feed fetch failed (attempt {}): {}",
                        self.consecutive_failures, e
                    );
                    if !self.pause(self.retry_backoff) {
                        break;
                    }
                    continue;
                }
            };

            let snapshots = match self.decoder.decode(&bytes) {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    stats.decode_failures += 1;
                    metrics::counter!("ingest_decode_failures_total").increment(1);
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    warn!(
                        "Feed decode failed (attempt {}): {}",
                        self.consecutive_failures, e
                    );
                    if !self.pause(self.retry_backoff) {
                        break;
                    }
                    continue;
                }
            };
            drop(bytes);
            self.consecutive_failures = 0;

            if !self.push_all(snapshots, &mut stats) {
                debug!("Queue rejected push, abandoning batch");
                break;
            }

            if !self.pause(self.poll_interval) {
                break;
            }
        }

        info!(
            "Producer stopped: {} polls, {} pushed, {} filtered, {} rejected",
            stats.polls, stats.pushed, stats.filtered, stats.rejected
        );
        stats
    }

    /// Push every snapshot with a valid position.
    ///
    /// Returns `false` as soon as the queue refuses a push (shutdown); the
    /// remaining snapshots are dropped.
    fn push_all(&self, snapshots: Vec<VehicleSnapshot>, stats: &mut ProducerStats) -> bool {
        let total = snapshots.len();
        let mut pushed = 0u64;

        for snapshot in snapshots {
            if !snapshot.has_valid_position() {
                stats.filtered += 1;
                continue;
            }
            if !self.queue.push(snapshot) {
                stats.rejected += 1;
                return false;
            }
            pushed += 1;
            stats.pushed += 1;
            metrics::counter!("ingest_snapshots_pushed_total").increment(1);
        }

        metrics::gauge!("ingest_queue_depth").set(self.queue.len() as f64);
        debug!("Pushed {} of {} decoded snapshots", pushed, total);
        true
    }

    /// Sleep for `duration`, waking every `shutdown_check` to look for shutdown.
    /// Returns `false` if shutdown cut the sleep short.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;

        loop {
            if self.queue.is_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(self.shutdown_check.min(deadline - now));
        }
    }
}

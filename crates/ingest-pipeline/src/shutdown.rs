//! Shutdown Coordination

use gtfs_feed::VehicleSnapshot;
use ring_buffer::BoundedQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Thin edge between an external stop request and the hand-off queue.
///
/// Holds nothing but the queue; the workers learn about shutdown from the
/// queue itself. Clones share one "already fired" flag, so the queue sees at
/// most one `signal_shutdown` call however many sources trigger.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    queue: Arc<BoundedQueue<VehicleSnapshot>>,
    fired: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(queue: Arc<BoundedQueue<VehicleSnapshot>>) -> Self {
        Self {
            queue,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown. Returns `true` for the call that actually signaled.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already requested");
            return false;
        }

        info!("Shutdown requested");
        self.queue.signal_shutdown();
        true
    }

    /// Whether shutdown has been requested through any clone
    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("fired", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_trigger_fires_once() {
        let queue = Arc::new(BoundedQueue::new(4).unwrap());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&queue));
        let other = coordinator.clone();

        assert!(!coordinator.is_triggered());
        assert!(coordinator.trigger());
        assert!(!other.trigger());
        assert!(other.is_triggered());
        assert!(queue.is_shutdown());
    }

    #[test]
    fn test_concurrent_triggers() {
        let queue = Arc::new(BoundedQueue::new(4).unwrap());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&queue));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = coordinator.clone();
                thread::spawn(move || c.trigger())
            })
            .collect();

        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&f| f)
            .count();
        assert_eq!(fired, 1);
        assert!(queue.is_shutdown());
    }
}

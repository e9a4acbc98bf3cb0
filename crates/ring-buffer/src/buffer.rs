//! Blocking Bounded Ring Buffer Implementation

use crate::QueueError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Default buffer capacity (1000 snapshots, a few full feed polls)
pub const DEFAULT_CAPACITY: usize = 1000;

/// State guarded by the queue lock
struct State<T> {
    /// Pre-allocated slots; live items occupy `[tail, tail + count) mod capacity`
    slots: Box<[Option<T>]>,
    /// Next write slot
    head: usize,
    /// Next read slot
    tail: usize,
    /// Number of live items
    count: usize,
    /// Set once, never cleared
    shutdown: bool,
    /// Items accepted since construction (for statistics)
    total_pushed: u64,
    /// Items handed out since construction (for statistics)
    total_popped: u64,
}

/// Fixed-capacity FIFO with blocking backpressure and drain-then-stop shutdown.
///
/// Producers block in [`push`](Self::push) while the buffer is full, consumers
/// block in [`pop`](Self::pop) while it is empty. After
/// [`signal_shutdown`](Self::signal_shutdown) every push is rejected, while pops
/// keep returning the remaining items until the buffer is empty.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    /// Signaled when an item is removed
    not_full: Condvar,
    /// Signaled when an item is added
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a new queue with the given capacity
    ///
    /// # Errors
    /// Returns [`QueueError::ZeroCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        debug!("Allocating bounded queue with {} slots", capacity);
        Ok(Self {
            state: Mutex::new(State {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
                shutdown: false,
                total_pushed: 0,
                total_popped: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    // Nothing panics while the lock is held, so a poisoned guard still
    // protects consistent state.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item, blocking while the buffer is full.
    ///
    /// Returns `false` without enqueuing once shutdown has been signaled,
    /// including when the shutdown arrives while this call is waiting for space.
    /// The rejected item is dropped; retrying is the caller's decision.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();

        while state.count == self.capacity && !state.shutdown {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.shutdown {
            return false;
        }

        let head = state.head;
        state.slots[head] = Some(item);
        state.head = (head + 1) % self.capacity;
        state.count += 1;
        state.total_pushed += 1;
        drop(state);

        self.not_empty.notify_one();
        true
    }

    /// Dequeue the oldest item, blocking while the buffer is empty.
    ///
    /// Returns `None` only when shutdown has been signaled and every item
    /// pushed before it has already been handed out.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();

        while state.count == 0 && !state.shutdown {
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.count == 0 {
            return None;
        }

        let tail = state.tail;
        let item = state.slots[tail].take();
        state.tail = (tail + 1) % self.capacity;
        state.count -= 1;
        state.total_popped += 1;
        drop(state);

        self.not_full.notify_one();
        item
    }

    /// Signal shutdown and wake every blocked pusher and popper.
    ///
    /// Idempotent. Returns `true` only for the call that flipped the flag.
    pub fn signal_shutdown(&self) -> bool {
        let mut state = self.lock();
        let first = !state.shutdown;
        state.shutdown = true;
        let remaining = state.count;
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();

        if first {
            info!("Queue shutdown signaled, {} items left to drain", remaining);
        }
        first
    }

    /// Whether shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Get the number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.lock().count
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Total items accepted by `push`
    pub fn total_pushed(&self) -> u64 {
        self.lock().total_pushed
    }

    /// Total items returned by `pop`
    pub fn total_popped(&self) -> u64 {
        self.lock().total_popped
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("count", &state.count)
            .field("head", &state.head)
            .field("tail", &state.tail)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u32>::new(0),
            Err(QueueError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_push_and_pop_fifo() {
        let queue = BoundedQueue::new(4).unwrap();

        for i in 0..4 {
            assert!(queue.push(i));
        }
        assert!(queue.is_full());

        for i in 0..4 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let queue = BoundedQueue::new(3).unwrap();

        // Walk head and tail around the ring several times
        for round in 0..5 {
            assert!(queue.push(round * 10));
            assert!(queue.push(round * 10 + 1));
            assert_eq!(queue.pop(), Some(round * 10));
            assert_eq!(queue.pop(), Some(round * 10 + 1));
        }
        assert_eq!(queue.total_pushed(), 10);
        assert_eq!(queue.total_popped(), 10);
    }

    #[test]
    fn test_fill_ratio() {
        let queue = BoundedQueue::new(100).unwrap();
        assert_eq!(queue.fill_ratio(), 0.0);

        for i in 0..50 {
            queue.push(i);
        }

        assert!((queue.fill_ratio() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_blocked_pushes_resume_in_order() {
        // Capacity 3, five pushes against a slow popper: 4 and 5 must wait
        let queue = Arc::new(BoundedQueue::new(3).unwrap());
        let (tx, rx) = mpsc::channel();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 1..=5 {
                    assert!(queue.push(i));
                    tx.send(i).unwrap();
                }
            })
        };

        // The first three pushes complete without a consumer
        for expected in 1..=3 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(expected));
        }
        // The fourth is blocked on a full buffer
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(queue.len(), 3);

        let mut seen = Vec::new();
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(20));
            seen.push(queue.pop().unwrap());
        }

        producer.join().unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_drain_after_shutdown() {
        let queue = BoundedQueue::new(10).unwrap();
        assert!(queue.push("A"));
        assert!(queue.push("B"));

        queue.signal_shutdown();

        assert_eq!(queue.pop(), Some("A"));
        assert_eq!(queue.pop(), Some("B"));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_rejected_after_shutdown() {
        let queue = BoundedQueue::new(10).unwrap();
        queue.signal_shutdown();

        assert!(!queue.push(1));
        assert!(!queue.push(2));
        assert!(queue.is_empty());
        assert_eq!(queue.total_pushed(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let queue = BoundedQueue::new(2).unwrap();
        assert!(queue.push(7));

        assert!(queue.signal_shutdown());
        assert!(!queue.signal_shutdown());
        assert!(!queue.signal_shutdown());

        assert!(queue.is_shutdown());
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_shutdown_releases_blocked_pusher() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        assert!(queue.push(1));

        let (tx, rx) = mpsc::channel();
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || tx.send(queue.push(2)).unwrap())
        };

        // Still blocked on the full slot
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        queue.signal_shutdown();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(false));
        pusher.join().unwrap();

        // The original item is still delivered exactly once
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_shutdown_releases_blocked_poppers() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4).unwrap());
        let (tx, rx) = mpsc::channel();

        let poppers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                thread::spawn(move || tx.send(queue.pop()).unwrap())
            })
            .collect();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        queue.signal_shutdown();
        for _ in 0..3 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(None));
        }
        for popper in poppers {
            popper.join().unwrap();
        }
    }

    #[test]
    fn test_every_accepted_item_is_delivered() {
        let queue = Arc::new(BoundedQueue::new(8).unwrap());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut received = Vec::new();
                while let Some(item) = queue.pop() {
                    received.push(item);
                }
                received
            })
        };

        let mut accepted = Vec::new();
        for i in 0..500u32 {
            if queue.push(i) {
                accepted.push(i);
            }
            if i == 400 {
                queue.signal_shutdown();
            }
        }

        let received = consumer.join().unwrap();
        assert_eq!(accepted.len(), 401);
        assert_eq!(received, accepted);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u16),
        Pop,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u16>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        // Single-threaded model check: non-blocking ops only, against a VecDeque
        #[test]
        fn prop_matches_fifo_model(
            capacity in 1usize..16,
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let queue = BoundedQueue::new(capacity).unwrap();
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(v) if model.len() < capacity => {
                        prop_assert!(queue.push(v));
                        model.push_back(v);
                    }
                    Op::Pop if !model.is_empty() => {
                        prop_assert_eq!(queue.pop(), model.pop_front());
                    }
                    _ => {}
                }
                prop_assert!(queue.len() <= capacity);
                prop_assert_eq!(queue.len(), model.len());
            }

            queue.signal_shutdown();
            while let Some(expected) = model.pop_front() {
                prop_assert_eq!(queue.pop(), Some(expected));
            }
            prop_assert_eq!(queue.pop(), None);
        }
    }
}

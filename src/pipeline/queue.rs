//! # Bounded Delivery Queue
//!
//! FIFO between the ingestion contexts and the aggregation worker.
//!
//! Entries are boxed at enqueue and owned by the queue until dequeued. When
//! no slot can be reserved the producer purges up to `purge_batch` of the
//! oldest entries, retries once, and drops the new entry if that also
//! fails. Producers only ever take a short internal lock; the consumer is
//! the only side that waits.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{error, warn};

/// Default maximum outstanding entries
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default number of oldest entries purged on exhaustion
pub const DEFAULT_PURGE_BATCH: usize = 5;

/// Result of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Stored on the first attempt
    Queued,

    /// Stored after purging `purged` old entries
    Recovered { purged: usize },

    /// Purged `purged` old entries and still had no room; the new entry was dropped
    Dropped { purged: usize },

    /// Queue closed, entry discarded
    Closed,
}

impl EnqueueOutcome {
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Queued | Self::Recovered { .. })
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub recovered: u64,
    pub purged: u64,
    pub dropped: u64,
}

struct State<T> {
    entries: VecDeque<Box<T>>,
    closed: bool,
    stats: QueueStats,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
    purge_batch: usize,
}

impl<T> Shared<T> {
    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}

/// Create a queue holding at most `capacity` entries
pub fn bounded<T>(capacity: usize, purge_batch: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            entries: VecDeque::new(),
            closed: false,
            stats: QueueStats::default(),
        }),
        available: Condvar::new(),
        capacity,
        purge_batch,
    });

    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

/// Producer handle, cloneable across ingestion contexts
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue without blocking
    pub fn send(&self, item: T) -> EnqueueOutcome {
        let mut state = self.shared.state.lock();
        if state.closed {
            return EnqueueOutcome::Closed;
        }

        let entry = Box::new(item);
        let outcome = if reserve_slot(&mut state.entries, self.shared.capacity) {
            EnqueueOutcome::Queued
        } else {
            warn!("Delivery queue exhausted, purging oldest entries");
            let purged = purge_oldest(&mut state.entries, self.shared.purge_batch);
            state.stats.purged += purged as u64;

            if reserve_slot(&mut state.entries, self.shared.capacity) {
                state.stats.recovered += 1;
                EnqueueOutcome::Recovered { purged }
            } else {
                state.stats.dropped += 1;
                error!("Delivery queue still exhausted after purging {} entries, record dropped", purged);
                return EnqueueOutcome::Dropped { purged };
            }
        };

        state.entries.push_back(entry);
        state.stats.enqueued += 1;
        drop(state);

        self.shared.available.notify_one();
        outcome
    }

    /// Stop accepting entries and wake the consumer
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats
    }
}

/// Consumer handle
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueReceiver<T> {
    /// Wait for the next entry
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn recv(&self) -> Option<Box<T>> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(entry) = state.entries.pop_front() {
                state.stats.dequeued += 1;
                return Some(entry);
            }
            if state.closed {
                return None;
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Next entry if one is ready
    pub fn try_recv(&self) -> Option<Box<T>> {
        let mut state = self.shared.state.lock();
        let entry = state.entries.pop_front()?;
        state.stats.dequeued += 1;
        Some(entry)
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reserve room for one more entry within the slot budget
fn reserve_slot<T>(entries: &mut VecDeque<Box<T>>, capacity: usize) -> bool {
    entries.len() < capacity && entries.try_reserve(1).is_ok()
}

fn purge_oldest<T>(entries: &mut VecDeque<Box<T>>, batch: usize) -> usize {
    let purged = batch.min(entries.len());
    entries.drain(..purged);
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = bounded(8, DEFAULT_PURGE_BATCH);
        for n in 0..5 {
            assert_eq!(tx.send(n), EnqueueOutcome::Queued);
        }

        let drained: Vec<i32> = std::iter::from_fn(|| rx.try_recv().map(|b| *b)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_purge_and_retry() {
        let (tx, rx) = bounded(8, 5);
        for n in 0..8 {
            tx.send(n);
        }

        assert_eq!(tx.send(8), EnqueueOutcome::Recovered { purged: 5 });
        assert_eq!(tx.len(), 4);

        let drained: Vec<i32> = std::iter::from_fn(|| rx.try_recv().map(|b| *b)).collect();
        assert_eq!(drained, vec![5, 6, 7, 8]);

        let stats = tx.stats();
        assert_eq!(stats.enqueued, 9);
        assert_eq!(stats.purged, 5);
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_purge_limited_by_queue_length() {
        let (tx, _rx) = bounded(2, 5);
        tx.send(1);
        tx.send(2);
        assert_eq!(tx.send(3), EnqueueOutcome::Recovered { purged: 2 });
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_drop_when_purge_reclaims_nothing() {
        let (tx, rx) = bounded(2, 0);
        tx.send(1);
        tx.send(2);

        assert_eq!(tx.send(3), EnqueueOutcome::Dropped { purged: 0 });
        assert_eq!(tx.stats().dropped, 1);
        assert_eq!(rx.try_recv().map(|b| *b), Some(1));
        assert_eq!(rx.try_recv().map(|b| *b), Some(2));
    }

    #[test]
    fn test_zero_capacity_drops() {
        let (tx, rx) = bounded::<u8>(0, 5);
        assert_eq!(tx.send(1), EnqueueOutcome::Dropped { purged: 0 });
        assert!(rx.is_empty());
    }

    #[test]
    fn test_producer_never_blocks() {
        let (tx, _rx) = bounded(4, 2);
        let start = Instant::now();
        for n in 0..10_000 {
            assert!(tx.send(n).is_stored());
        }
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(tx.len() <= 4);
    }

    #[test]
    fn test_recv_blocks_until_data() {
        let (tx, rx) = bounded(4, 1);
        let consumer = thread::spawn(move || rx.recv().map(|b| *b));

        thread::sleep(Duration::from_millis(50));
        tx.send(42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_close_drains_then_stops() {
        let (tx, rx) = bounded(4, 1);
        tx.send(1);
        tx.send(2);
        tx.close();

        assert_eq!(tx.send(3), EnqueueOutcome::Closed);
        assert_eq!(rx.recv().map(|b| *b), Some(1));
        assert_eq!(rx.recv().map(|b| *b), Some(2));
        assert_eq!(rx.recv(), None);
        assert!(rx.is_closed());
    }

    #[test]
    fn test_close_wakes_waiting_consumer() {
        let (tx, rx) = bounded::<u32>(4, 1);
        let consumer = thread::spawn(move || rx.recv());

        thread::sleep(Duration::from_millis(50));
        tx.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_multiple_producers() {
        let (tx, rx) = bounded(1024, 5);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for n in 0..100 {
                        tx.send(p * 1000 + n);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut received = Vec::new();
        while let Some(item) = rx.try_recv() {
            received.push(*item);
        }
        assert_eq!(received.len(), 400);

        // Per-producer order is preserved
        for p in 0..4 {
            let own: Vec<_> = received.iter().filter(|&&v| v / 1000 == p).collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

//! # Aggregation Worker
//!
//! Single consumer of the delivery queue. Each packet is stamped with the
//! worker's receive time, folded into the shadow under its lock, and the
//! updated copy is handed to the uplink after the lock is released. Kinds
//! without a shadow group still refresh the timestamp and notify.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::queue::QueueReceiver;
use super::shadow::{ShadowState, SharedShadow};
use super::notify::UplinkNotifier;
use super::uptime_ms;
use crate::ingest::SensorPacket;

/// Worker thread name
pub const WORKER_THREAD_NAME: &str = "aggregation-worker";

/// Counters reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Packets taken from the queue
    pub processed: u64,

    /// Packets that changed a sensor group of the shadow
    pub folded: u64,

    pub notified: u64,

    /// Updates not sent because the uplink was disabled
    pub skipped: u64,

    pub notify_errors: u64,
}

pub struct AggregationWorker<N: UplinkNotifier> {
    queue: QueueReceiver<SensorPacket>,
    shadow: SharedShadow,
    notifier: N,
    started: Instant,
    stats: WorkerStats,
}

impl<N: UplinkNotifier> AggregationWorker<N> {
    /// # Arguments
    ///
    /// * `started` - Pipeline start, the origin of receive timestamps
    pub fn new(queue: QueueReceiver<SensorPacket>, shadow: SharedShadow, notifier: N, started: Instant) -> Self {
        Self {
            queue,
            shadow,
            notifier,
            started,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Fold one packet and notify the uplink
    ///
    /// Returns the updated shadow. The packet is released here.
    pub fn process(&mut self, packet: Box<SensorPacket>) -> ShadowState {
        self.stats.processed += 1;
        let received_at = uptime_ms(self.started);

        let (state, folded) = self.shadow.update(&packet.record, received_at);
        if folded {
            self.stats.folded += 1;
        } else {
            debug!("{:?} has no shadow group, timestamp only", packet.record.kind);
        }
        drop(packet);

        if !self.notifier.is_enabled() {
            self.stats.skipped += 1;
            return state;
        }

        match self.notifier.notify(&state) {
            Ok(()) => self.stats.notified += 1,
            Err(e) => {
                self.stats.notify_errors += 1;
                warn!("Uplink notification failed: {}", e);
            }
        }

        state
    }

    /// Drain the queue until it is closed and empty
    pub fn run(mut self) -> WorkerStats {
        info!("Aggregation worker started");
        while let Some(packet) = self.queue.recv() {
            debug!("{}", packet);
            self.process(packet);
        }
        info!("Aggregation worker stopped after {} packets", self.stats.processed);
        self.stats
    }
}

impl<N: UplinkNotifier + 'static> AggregationWorker<N> {
    /// Run on a dedicated thread
    pub fn spawn(self) -> io::Result<JoinHandle<WorkerStats>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }
}

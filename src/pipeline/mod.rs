//! # Pipeline Module
//!
//! Wires ingestion, the delivery queue and the aggregation worker together:
//!
//! ```text
//! advertisement ─► Ingestor ─► QueueSender ═► AggregationWorker ─► SharedShadow
//! local record  ──────────────►    │                 │
//!                                  │                 └─► ShadowBroadcast ─► uplink
//! ```
//!
//! The pipeline is built once at start-up and handed to every input
//! context by reference.

pub mod queue;
pub mod shadow;
pub mod notify;
pub mod worker;

use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConcentratorError, Result};
use crate::ingest::{IngestOutcome, IngestStats, Ingestor, SensorPacket, SourceId, SourceTable};
use crate::telemetry::TelemetryRecord;

pub use notify::{ShadowBroadcast, UplinkNotifier};
pub use queue::{bounded, EnqueueOutcome, QueueReceiver, QueueSender, QueueStats};
pub use shadow::{ShadowState, ShadowView, SharedShadow};
pub use worker::{AggregationWorker, WorkerStats};

/// Milliseconds since `started`, wrapping like a 32-bit uptime counter
pub fn uptime_ms(started: Instant) -> u32 {
    started.elapsed().as_millis() as u32
}

/// Running ingestion pipeline
pub struct Pipeline {
    ingestor: Ingestor,
    sender: QueueSender<SensorPacket>,
    shadow: SharedShadow,
    broadcast: ShadowBroadcast,
    local_source: SourceId,
    started: Instant,
    worker: Option<JoinHandle<WorkerStats>>,
}

impl Pipeline {
    /// Build the pipeline and start the aggregation worker
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A configured address does not parse
    /// - The worker thread cannot be spawned
    pub fn start(config: &Config) -> Result<Self> {
        let local_source = config.ingest.local_source()?;
        let sources = SourceTable::new(config.ingest.dedup_capacity, config.ingest.overflow_policy);
        let mut ingestor = Ingestor::new(config.ingest.provider_tag, sources);
        if let Some(list) = config.ingest.accept_list()? {
            info!("Accept list enabled with {} sources", list.len());
            ingestor = ingestor.with_accept_list(list);
        }

        let (sender, receiver) = bounded(config.queue.capacity, config.queue.purge_batch);
        let shadow = SharedShadow::new();
        let broadcast = ShadowBroadcast::new();
        let started = Instant::now();

        let worker = AggregationWorker::new(receiver, shadow.clone(), broadcast.clone(), started).spawn()?;

        info!(
            "Pipeline started (provider tag 0x{:04X}, queue capacity {}, dedup capacity {})",
            config.ingest.provider_tag, config.queue.capacity, config.ingest.dedup_capacity
        );

        Ok(Self {
            ingestor,
            sender,
            shadow,
            broadcast,
            local_source,
            started,
            worker: Some(worker),
        })
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Milliseconds since the pipeline started
    pub fn uptime_ms(&self) -> u32 {
        uptime_ms(self.started)
    }

    /// Handle a complete advertising payload from `source`
    pub fn ingest_advertisement(&self, source: SourceId, payload: &[u8]) -> IngestOutcome {
        let outcome = self.ingestor.handle_advertisement(source, self.uptime_ms(), payload);
        self.forward(&outcome);
        outcome
    }

    /// Handle manufacturer data already extracted from an advertisement
    pub fn ingest_manufacturer_data(&self, source: SourceId, data: &[u8]) -> IngestOutcome {
        let outcome = self.ingestor.handle_manufacturer_data(source, self.uptime_ms(), data);
        self.forward(&outcome);
        outcome
    }

    /// Queue a record produced locally (e.g. by the GNSS receiver),
    /// bypassing advertisement matching
    pub fn submit_record(&self, record: TelemetryRecord) -> EnqueueOutcome {
        self.sender.send(SensorPacket {
            source: self.local_source,
            received_at: self.uptime_ms(),
            record,
        })
    }

    fn forward(&self, outcome: &IngestOutcome) {
        if let Some(packet) = outcome.packet() {
            match self.sender.send(*packet) {
                EnqueueOutcome::Queued => {}
                EnqueueOutcome::Recovered { purged } => {
                    debug!("Queued {} after purging {} entries", packet.source, purged)
                }
                EnqueueOutcome::Dropped { .. } => warn!("Dropped record from {}", packet.source),
                EnqueueOutcome::Closed => debug!("Pipeline closed, record from {} discarded", packet.source),
            }
        }
    }

    /// Copy of the current shadow
    pub fn snapshot(&self) -> ShadowState {
        self.shadow.snapshot()
    }

    /// Subscribe to shadow updates; the uplink is enabled while a
    /// subscriber exists
    pub fn subscribe(&self) -> watch::Receiver<ShadowState> {
        self.broadcast.subscribe()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.ingestor.stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.sender.stats()
    }

    /// Close the queue, let the worker drain it, and wait for it to stop
    ///
    /// # Errors
    ///
    /// Returns error if the worker thread panicked
    pub fn shutdown(mut self) -> Result<WorkerStats> {
        self.sender.close();
        let handle = self
            .worker
            .take()
            .ok_or_else(|| ConcentratorError::Worker("worker already stopped".to_string()))?;

        let stats = handle
            .join()
            .map_err(|_| ConcentratorError::Worker("aggregation worker panicked".to_string()))?;
        info!(
            "Pipeline stopped: {} processed, {} folded, {} notified",
            stats.processed, stats.folded, stats.notified
        );
        Ok(stats)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Unblocks the worker if shutdown() was never called
        self.sender.close();
    }
}

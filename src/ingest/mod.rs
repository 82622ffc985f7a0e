//! # Ingest Module
//!
//! Turns advertisement payloads from sensor nodes into telemetry packets.
//!
//! This module handles:
//! - Source addressing (48-bit address + public/random type)
//! - Provider tag filtering and record decoding
//! - Optional accept list
//! - Per-source duplicate suppression

pub mod advertisement;
pub mod accept_list;
pub mod dedup;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ConcentratorError, Result};
use crate::telemetry::{CodecError, SensorKind, TelemetryRecord, DEFAULT_PROVIDER_TAG};

pub use accept_list::{AcceptList, AcceptOutcome};
pub use dedup::{DedupVerdict, OverflowPolicy, SourceTable, DEFAULT_DEDUP_CAPACITY};

/// Address of a sensor node
///
/// Bytes are stored most significant first, as printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    addr: [u8; 6],
    random: bool,
}

impl SourceId {
    pub const fn public(addr: [u8; 6]) -> Self {
        Self { addr, random: false }
    }

    pub const fn random(addr: [u8; 6]) -> Self {
        Self { addr, random: true }
    }

    pub fn addr(&self) -> [u8; 6] {
        self.addr
    }

    pub fn is_random(&self) -> bool {
        self.random
    }

    /// Parse the 7-byte form written by a management client:
    /// address least significant byte first, then the type (0 public, 1 random)
    ///
    /// # Errors
    ///
    /// Returns error if the length or type byte is invalid
    pub fn from_gatt_bytes(raw: &[u8]) -> Result<Self> {
        let [a0, a1, a2, a3, a4, a5, kind] = raw else {
            return Err(ConcentratorError::InvalidAddress(format!(
                "expected 7 bytes, got {}",
                raw.len()
            )));
        };

        let addr = [*a5, *a4, *a3, *a2, *a1, *a0];
        match kind {
            0x00 => Ok(Self::public(addr)),
            0x01 => Ok(Self::random(addr)),
            other => Err(ConcentratorError::InvalidAddress(format!(
                "unknown address type 0x{:02X}",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.addr;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} ({})",
            a[0],
            a[1],
            a[2],
            a[3],
            a[4],
            a[5],
            if self.random { "random" } else { "public" }
        )
    }
}

impl FromStr for SourceId {
    type Err = ConcentratorError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, optionally followed by ` (public)` or
    /// ` (random)`; the type defaults to public
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ConcentratorError::InvalidAddress(s.to_string());

        let s = s.trim();
        let (addr_part, random) = match s.split_once(' ') {
            Some((addr, "(random)")) => (addr, true),
            Some((addr, "(public)")) => (addr, false),
            Some(_) => return Err(invalid()),
            None => (s, false),
        };

        let mut addr = [0u8; 6];
        let mut octets = addr_part.split(':');
        for byte in addr.iter_mut() {
            let octet = octets.next().ok_or_else(invalid)?;
            if octet.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(octet, 16).map_err(|_| invalid())?;
        }
        if octets.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { addr, random })
    }
}

/// A record accepted from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPacket {
    pub source: SourceId,

    /// Local receipt time, ms since pipeline start
    pub received_at: u32,

    pub record: TelemetryRecord,
}

impl fmt::Display for SensorPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.source, self.received_at, self.record)
    }
}

/// What happened to one advertisement
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Forwarded for aggregation
    Accepted(SensorPacket),

    /// Same timestamp as the last record from this source
    Duplicate,

    /// Source not on the accept list
    NotListed,

    /// No manufacturer data large enough for a record
    NoManufacturerData,

    /// Provider tag mismatch, not decoded
    ForeignTag(u16),

    /// Record could not be decoded
    DecodeFailed(CodecError),

    /// Source reported an error record
    ErrorRecord,
}

impl IngestOutcome {
    pub fn packet(&self) -> Option<&SensorPacket> {
        match self {
            Self::Accepted(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub not_listed: u64,
    pub no_manufacturer_data: u64,
    pub foreign_tags: u64,
    pub decode_failures: u64,
    pub error_records: u64,
}

#[derive(Debug, Default)]
struct IngestCounters {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    not_listed: AtomicU64,
    no_manufacturer_data: AtomicU64,
    foreign_tags: AtomicU64,
    decode_failures: AtomicU64,
    error_records: AtomicU64,
}

impl IngestCounters {
    fn count(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Accepted(_) => &self.accepted,
            IngestOutcome::Duplicate => &self.duplicates,
            IngestOutcome::NotListed => &self.not_listed,
            IngestOutcome::NoManufacturerData => &self.no_manufacturer_data,
            IngestOutcome::ForeignTag(_) => &self.foreign_tags,
            IngestOutcome::DecodeFailed(_) => &self.decode_failures,
            IngestOutcome::ErrorRecord => &self.error_records,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            not_listed: self.not_listed.load(Ordering::Relaxed),
            no_manufacturer_data: self.no_manufacturer_data.load(Ordering::Relaxed),
            foreign_tags: self.foreign_tags.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            error_records: self.error_records.load(Ordering::Relaxed),
        }
    }
}

/// Matches advertisements against the provider tag and suppresses duplicates
///
/// Safe to call from several receive contexts: the source table and the
/// accept list each sit behind their own lock.
#[derive(Debug)]
pub struct Ingestor {
    provider_tag: u16,
    sources: Mutex<SourceTable>,
    accept_list: Option<Mutex<AcceptList>>,
    counters: IngestCounters,
}

impl Ingestor {
    pub fn new(provider_tag: u16, sources: SourceTable) -> Self {
        Self {
            provider_tag,
            sources: Mutex::new(sources),
            accept_list: None,
            counters: IngestCounters::default(),
        }
    }

    /// Only accept packets from sources on `list`
    pub fn with_accept_list(mut self, list: AcceptList) -> Self {
        self.accept_list = Some(Mutex::new(list));
        self
    }

    pub fn provider_tag(&self) -> u16 {
        self.provider_tag
    }

    /// Whether packets are filtered by an accept list
    pub fn filters_sources(&self) -> bool {
        self.accept_list.is_some()
    }

    /// Add a source to the accept list
    ///
    /// Returns `None` when filtering is disabled.
    pub fn accept_source(&self, source: SourceId) -> Option<AcceptOutcome> {
        self.accept_list.as_ref().map(|list| list.lock().add(source))
    }

    /// Remove a source from the accept list, returning `true` if it was listed
    pub fn reject_source(&self, source: &SourceId) -> bool {
        self.accept_list
            .as_ref()
            .is_some_and(|list| list.lock().remove(source))
    }

    pub fn clear_accept_list(&self) {
        if let Some(list) = &self.accept_list {
            list.lock().clear();
        }
    }

    /// Copy of the listed sources, `None` when filtering is disabled
    pub fn accepted_sources(&self) -> Option<Vec<SourceId>> {
        self.accept_list
            .as_ref()
            .map(|list| list.lock().iter().copied().collect())
    }

    /// Number of sources currently tracked for dedup
    pub fn tracked_sources(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Handle a complete advertising payload
    pub fn handle_advertisement(&self, source: SourceId, received_at: u32, payload: &[u8]) -> IngestOutcome {
        let outcome = match advertisement::manufacturer_data(payload) {
            Some(data) => self.match_record(source, received_at, data),
            None => {
                trace!("{}: no manufacturer data", source);
                IngestOutcome::NoManufacturerData
            }
        };
        self.counters.count(&outcome);
        outcome
    }

    /// Handle manufacturer data already extracted by the radio stack
    pub fn handle_manufacturer_data(&self, source: SourceId, received_at: u32, data: &[u8]) -> IngestOutcome {
        let outcome = self.match_record(source, received_at, data);
        self.counters.count(&outcome);
        outcome
    }

    fn match_record(&self, source: SourceId, received_at: u32, data: &[u8]) -> IngestOutcome {
        if let Some(list) = &self.accept_list {
            if !list.lock().contains(&source) {
                trace!("{}: not on accept list", source);
                return IngestOutcome::NotListed;
            }
        }

        match TelemetryRecord::peek_source_tag(data) {
            Some(tag) if tag == self.provider_tag => {}
            Some(tag) => {
                trace!("{}: foreign provider tag 0x{:04X}", source, tag);
                return IngestOutcome::ForeignTag(tag);
            }
            None => return IngestOutcome::NoManufacturerData,
        }

        let record = match TelemetryRecord::decode(data) {
            Ok(record) => record,
            Err(e) => {
                debug!("{}: dropping record: {}", source, e);
                return IngestOutcome::DecodeFailed(e);
            }
        };

        if record.kind == SensorKind::Error {
            debug!("{}: source reported an error record", source);
            return IngestOutcome::ErrorRecord;
        }

        let verdict = self.sources.lock().observe(source, record.timestamp);
        if !verdict.is_forwarded() {
            trace!("{}: duplicate record @ {} ms", source, record.timestamp);
            return IngestOutcome::Duplicate;
        }

        let packet = SensorPacket {
            source,
            received_at,
            record,
        };
        debug!("{}", packet);
        IngestOutcome::Accepted(packet)
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_TAG, SourceTable::default())
    }
}

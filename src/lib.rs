//! # Telemetry Concentrator Library
//!
//! Collect sensor telemetry from low-power nodes and GNSS receivers into one
//! latest-known state for uplink.
//!
//! This library provides the GNSS wire decoders (UBX and NMEA), the compact
//! telemetry record codec, advertisement ingestion with deduplication, and the
//! bounded queue and aggregation worker that maintain the shadow state.

pub mod config;
pub mod error;
pub mod gnss;
pub mod ingest;
pub mod pipeline;
pub mod serial;
pub mod telemetry;

//! # Telemetry Concentrator
//!
//! Aggregates sensor node telemetry and the local GNSS fix into one shadow
//! state and streams every update to the uplink as a JSON line.
//!
//! Usage: `telemetry-concentrator [CONFIG.toml]`

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use telemetry_concentrator::config::{Config, GnssConfig, LoggingConfig};
use telemetry_concentrator::gnss::{GnssDecoder, GnssFix, GnssProtocol};
use telemetry_concentrator::pipeline::{Pipeline, ShadowState};
use telemetry_concentrator::serial::GnssSerial;
use telemetry_concentrator::telemetry::{CodecError, TelemetryRecord};

/// Number of GNSS fixes between status log messages
const LOG_INTERVAL_FIXES: u64 = 60;

/// Rolling log file name prefix
const LOG_FILE_PREFIX: &str = "telemetry-concentrator.log";

/// Main entry point
///
/// # Control Flow
///
/// 1. Load configuration (first argument, or built-in defaults)
/// 2. Initialize logging
/// 3. Start the pipeline and, if enabled, the uplink task
/// 4. Read GNSS fixes into the pipeline until Ctrl+C
/// 5. Drain the queue, stop the worker and log final statistics
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be read or is invalid
/// - The pipeline cannot be started
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    let _guard = init_logging(&config.logging)?;
    info!("Telemetry Concentrator v{} starting...", env!("CARGO_PKG_VERSION"));

    let pipeline = Pipeline::start(&config).context("Failed to start pipeline")?;

    let uplink = config.uplink.enabled.then(|| tokio::spawn(run_uplink(pipeline.subscribe())));
    if uplink.is_none() {
        info!("Uplink disabled, shadow updates are not published");
    }

    info!("Press Ctrl+C to exit");

    let mut gnss_running = config.gnss.enabled;
    tokio::select! {
        result = run_gnss(&config.gnss, &pipeline, config.ingest.provider_tag), if gnss_running => {
            gnss_running = false;
            match result {
                Ok(()) => warn!("GNSS stream ended"),
                Err(e) => error!("GNSS input stopped: {:#}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }
    if !gnss_running && config.gnss.enabled {
        tokio::signal::ctrl_c().await?;
    }
    info!("Received Ctrl+C, shutting down...");

    let ingest = pipeline.ingest_stats();
    let queue = pipeline.queue_stats();
    let worker = tokio::task::spawn_blocking(move || pipeline.shutdown()).await??;

    if let Some(task) = uplink {
        if let Err(e) = task.await {
            warn!("Uplink task failed: {}", e);
        }
    }

    info!("Ingest: {}", serde_json::to_string(&ingest)?);
    info!("Queue: {}", serde_json::to_string(&queue)?);
    info!("Worker: {}", serde_json::to_string(&worker)?);

    Ok(())
}

/// Install the stdout subscriber and, when a directory is configured, a
/// daily rolling log file
///
/// `RUST_LOG` overrides `logging.level`. The returned guard flushes the file
/// writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (file_layer, guard) = if config.directory.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// Open the receiver and forward every fix as a local GNSS record
async fn run_gnss(config: &GnssConfig, pipeline: &Pipeline, provider_tag: u16) -> Result<()> {
    let mut serial = if config.port.is_empty() {
        GnssSerial::open(config.baud_rate)?
    } else {
        GnssSerial::open_with_paths(&[config.port.as_str()], config.baud_rate)?
    };

    if config.protocol == GnssProtocol::Ubx {
        serial.configure_ubx_output().await?;
    }

    info!("Reading {} fixes from {}", config.protocol, serial.device_path());
    let mut reader = serial.into_reader(GnssDecoder::new(config.protocol), config.read_buffer_size);

    let mut fixes: u64 = 0;
    while let Some(fix) = reader.next_fix().await? {
        let record = match gnss_record(&fix, provider_tag, pipeline.uptime_ms()) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding GNSS fix: {}", e);
                continue;
            }
        };

        let outcome = pipeline.submit_record(record);
        if !outcome.is_stored() {
            warn!("GNSS record not queued: {:?}", outcome);
        }

        fixes += 1;
        if fixes % LOG_INTERVAL_FIXES == 0 {
            info!("Forwarded {} GNSS fixes ({} bytes read)", fixes, reader.bytes_read());
        }
    }

    Ok(())
}

/// Quantize a fix into a telemetry record
fn gnss_record(fix: &GnssFix, provider_tag: u16, timestamp: u32) -> Result<TelemetryRecord, CodecError> {
    TelemetryRecord::from_reading(provider_tag, timestamp, &fix.to_reading())
}

/// Publish each shadow update as one JSON line until the pipeline stops
async fn run_uplink(mut updates: watch::Receiver<ShadowState>) {
    debug!("Uplink subscribed to shadow updates");
    while updates.changed().await.is_ok() {
        let state = *updates.borrow_and_update();
        match uplink_line(&state) {
            Ok(line) => info!(target: "uplink", "{}", line),
            Err(e) => warn!("Failed to format shadow update: {}", e),
        }
    }
    debug!("Uplink stopped");
}

fn uplink_line(state: &ShadowState) -> serde_json::Result<String> {
    serde_json::to_string(&state.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_concentrator::telemetry::SensorKind;

    #[test]
    fn test_log_interval_constant() {
        assert_eq!(LOG_INTERVAL_FIXES, 60, "One status line per minute at 1 Hz");
    }

    #[test]
    fn test_gnss_record_from_fix() {
        let fix = GnssFix {
            protocol: GnssProtocol::Ubx,
            fix_quality: 3,
            latitude: -23.5505,
            longitude: -46.6333,
            altitude: 760.0,
            satellites: 9,
            hdop: None,
            date: None,
            time: None,
        };

        let record = gnss_record(&fix, 0x0059, 1234).unwrap();
        assert_eq!(record.kind, SensorKind::Gnss);
        assert_eq!(record.source_tag, 0x0059);
        assert_eq!(record.timestamp, 1234);
        assert_eq!(record.values[0], 3, "First value is the fix type");
    }

    #[test]
    fn test_gnss_record_rejects_out_of_range_altitude() {
        let fix = GnssFix {
            protocol: GnssProtocol::Nmea,
            fix_quality: 1,
            latitude: 48.07038,
            longitude: 11.31,
            altitude: 3.0e6,
            satellites: 8,
            hdop: Some(0.9),
            date: None,
            time: None,
        };

        assert!(gnss_record(&fix, 0x0059, 0).is_err());
    }

    #[test]
    fn test_uplink_line_is_single_json_object() {
        let state = ShadowState {
            temperature: 2250,
            movement: 1,
            ..Default::default()
        };

        let line = uplink_line(&state).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["temperature_c"], 22.5);
        assert_eq!(value["moving"], true);
        assert_eq!(value["standing"], false);
    }

    #[tokio::test]
    async fn test_uplink_task_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(ShadowState::default());
        let task = tokio::spawn(run_uplink(rx));

        tx.send_replace(ShadowState::default());
        drop(tx);

        task.await.unwrap();
    }
}

//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{ConcentratorError, Result};
use crate::gnss::GnssProtocol;
use crate::ingest::{AcceptList, OverflowPolicy, SourceId};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gnss: GnssConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub uplink: UplinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GNSS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GnssConfig {
    #[serde(default = "default_gnss_enabled")]
    pub enabled: bool,

    /// Serial device, empty to auto-detect
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_protocol")]
    pub protocol: GnssProtocol,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

/// Advertisement ingestion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_provider_tag")]
    pub provider_tag: u16,

    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Allowed sources; empty disables filtering
    #[serde(default)]
    pub accept_list: Vec<String>,

    /// Address the local GNSS receiver's records are attributed to
    #[serde(default = "default_local_source")]
    pub local_source: String,
}

/// Delivery queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    #[serde(default = "default_purge_batch")]
    pub purge_batch: usize,
}

/// Uplink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UplinkConfig {
    #[serde(default = "default_uplink_enabled")]
    pub enabled: bool,

    #[serde(default = "default_uplink_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files, empty for stdout only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_gnss_enabled() -> bool { true }
fn default_baud_rate() -> u32 { 9600 }
fn default_protocol() -> GnssProtocol { GnssProtocol::Ubx }
fn default_read_buffer_size() -> usize { 256 }

fn default_provider_tag() -> u16 { crate::telemetry::DEFAULT_PROVIDER_TAG }
fn default_dedup_capacity() -> usize { crate::ingest::DEFAULT_DEDUP_CAPACITY }
fn default_local_source() -> String { "00:00:00:00:00:00".to_string() }

fn default_queue_capacity() -> usize { crate::pipeline::queue::DEFAULT_QUEUE_CAPACITY }
fn default_purge_batch() -> usize { crate::pipeline::queue::DEFAULT_PURGE_BATCH }

fn default_uplink_enabled() -> bool { true }
fn default_uplink_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            enabled: default_gnss_enabled(),
            port: String::new(),
            baud_rate: default_baud_rate(),
            protocol: default_protocol(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            provider_tag: default_provider_tag(),
            dedup_capacity: default_dedup_capacity(),
            overflow_policy: OverflowPolicy::default(),
            accept_list: Vec::new(),
            local_source: default_local_source(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            purge_batch: default_purge_batch(),
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            enabled: default_uplink_enabled(),
            format: default_uplink_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl IngestConfig {
    /// Parsed accept list, `None` when filtering is disabled
    ///
    /// # Errors
    ///
    /// Returns error if an address does not parse
    pub fn accept_list(&self) -> Result<Option<AcceptList>> {
        if self.accept_list.is_empty() {
            return Ok(None);
        }
        let sources = self
            .accept_list
            .iter()
            .map(|s| s.parse::<SourceId>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(AcceptList::from_sources(sources)))
    }

    pub fn local_source(&self) -> Result<SourceId> {
        self.local_source.parse()
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_concentrator::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if ![4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800].contains(&self.gnss.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800",
            ));
        }

        if self.gnss.read_buffer_size == 0 || self.gnss.read_buffer_size > 4096 {
            return Err(invalid("read_buffer_size must be between 1 and 4096"));
        }

        if self.ingest.dedup_capacity == 0 || self.ingest.dedup_capacity > 1024 {
            return Err(invalid("dedup_capacity must be between 1 and 1024"));
        }

        if self.ingest.accept_list.len() > crate::ingest::accept_list::MAX_ACCEPT_LIST_SOURCES {
            return Err(invalid(format!(
                "accept_list holds at most {} sources",
                crate::ingest::accept_list::MAX_ACCEPT_LIST_SOURCES
            )));
        }

        for address in self.ingest.accept_list.iter().chain([&self.ingest.local_source]) {
            if address.parse::<SourceId>().is_err() {
                return Err(invalid(format!("invalid source address '{}'", address)));
            }
        }

        if self.queue.capacity == 0 || self.queue.capacity > 4096 {
            return Err(invalid("queue capacity must be between 1 and 4096"));
        }

        if self.queue.purge_batch == 0 || self.queue.purge_batch > self.queue.capacity {
            return Err(invalid("purge_batch must be between 1 and the queue capacity"));
        }

        if self.uplink.format != "jsonl" {
            return Err(invalid("uplink format must be 'jsonl' (only supported format)"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> ConcentratorError {
    ConcentratorError::Config(toml::de::Error::custom(msg))
}

//! # Serial Communication Module
//!
//! Handles the UART link to the GNSS receiver.
//!
//! This module handles:
//! - Opening the receiver's serial port (8N1, no flow control)
//! - Auto-detecting the device over common paths
//! - Sending UBX configuration commands
//! - Feeding received bytes to the GNSS decoder

pub mod reader;

use crate::error::{ConcentratorError, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

pub use reader::GnssReader;

/// Default GNSS receiver paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // u-blox USB CDC
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyAMA0", // on-board UART
];

/// GNSS receiver serial port
pub struct GnssSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for GnssSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GnssSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl GnssSerial {
    /// Open the receiver, auto-detecting the device over common paths
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_concentrator::serial::GnssSerial;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = GnssSerial::open(9600)?;
    ///     println!("GNSS on {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the receiver, trying `paths` in order
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Receiver UART baud rate
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened GNSS receiver at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(ConcentratorError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| ConcentratorError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Send one UBX command frame to the receiver
    pub async fn send_command(&mut self, frame: &[u8]) -> Result<()> {
        write_command(&mut self.port, frame).await
    }

    /// Switch a u-blox receiver to NAV-PVT output only
    pub async fn configure_ubx_output(&mut self) -> Result<()> {
        for frame in crate::gnss::encoder::receiver_setup_commands()? {
            self.send_command(&frame).await?;
        }
        info!("Configured {} for NAV-PVT output", self.device_path);
        Ok(())
    }

    /// Device path of the opened port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Turn the port into a fix reader
    pub fn into_reader(self, decoder: crate::gnss::GnssDecoder, buffer_size: usize) -> GnssReader<tokio_serial::SerialStream> {
        GnssReader::new(self.port, decoder, buffer_size)
    }
}

/// Write and flush one command frame
pub async fn write_command<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer
        .write_all(frame)
        .await
        .map_err(|e| ConcentratorError::Serial(format!("Failed to write command: {}", e)))?;

    writer
        .flush()
        .await
        .map_err(|e| ConcentratorError::Serial(format!("Failed to flush serial port: {}", e)))?;

    debug!("Sent UBX command ({} bytes)", frame.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnss::encoder::{disable_nmea_output, enable_nav_pvt};

    #[test]
    fn test_device_path_order() {
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyACM0");
        assert_eq!(DEFAULT_DEVICE_PATHS[1], "/dev/ttyUSB0");
        assert_eq!(DEFAULT_DEVICE_PATHS[2], "/dev/ttyAMA0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = GnssSerial::open_with_paths(invalid_paths, 9600);

        match result {
            Err(ConcentratorError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        assert!(matches!(
            GnssSerial::open_with_paths(empty_paths, 9600),
            Err(ConcentratorError::SerialPortNotFound(_))
        ));
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        match GnssSerial::open_port("/dev/nonexistent_serial_device_12345", 9600) {
            Err(ConcentratorError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_write_command_sends_exact_bytes() {
        let frame = enable_nav_pvt().unwrap();
        let mut port = tokio_test::io::Builder::new().write(&frame).build();

        write_command(&mut port, &frame).await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_commands_in_order() {
        let disable = disable_nmea_output().unwrap();
        let enable = enable_nav_pvt().unwrap();
        let mut port = tokio_test::io::Builder::new().write(&disable).write(&enable).build();

        for frame in crate::gnss::encoder::receiver_setup_commands().unwrap() {
            write_command(&mut port, &frame).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_write_error_is_reported() {
        let mut port = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();

        match write_command(&mut port, &[0xB5, 0x62]).await {
            Err(ConcentratorError::Serial(msg)) => assert!(msg.contains("Failed to write")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    // Only runs with a receiver attached
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_configure_real_receiver() {
        if let Ok(mut serial) = GnssSerial::open(9600) {
            let result = serial.configure_ubx_output().await;
            assert!(result.is_ok(), "Failed to configure receiver: {:?}", result);
        } else {
            println!("No GNSS hardware detected (skipping)");
        }
    }
}

//! # Serial Input Module
//!
//! Opens the satellite receiver's serial link and exposes raw streams as
//! [`ByteSource`]s.
//!
//! This module handles:
//! - Opening the serial port at 115,200 baud, 8N1
//! - Opening capture files for offline replay
//! - Teeing raw bytes into an optional capture file

pub mod source;

pub use source::{ByteSource, CaptureSink, StreamSource};

use crate::error::{SpektrumError, Result};
use std::path::Path;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Spektrum satellite baud rate (115,200 baud)
pub const SATELLITE_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common for satellites)
    "/dev/ttyAMA0", // Raspberry Pi UART
];

/// Satellite receiver serial port handle
pub struct SatelliteSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for SatelliteSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatelliteSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SatelliteSerial {
    /// Open the first device in `paths` that accepts the satellite settings
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Line speed, normally [`SATELLITE_BAUD_RATE`]
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried if none opens
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use spektrum_sat::serial::{SatelliteSerial, SATELLITE_BAUD_RATE};
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = SatelliteSerial::open_with_paths(&["/dev/ttyUSB0"], SATELLITE_BAUD_RATE)?;
    ///     println!("Connected to: {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened satellite receiver at {} ({} baud)", path, baud_rate);
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

        Err(SpektrumError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| SpektrumError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Path of the opened device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Wrap the port as a byte source, optionally teeing into a capture file
    pub fn into_source(
        self,
        capture: Option<CaptureSink>,
    ) -> StreamSource<tokio_serial::SerialStream> {
        let source = StreamSource::new(self.port);
        match capture {
            Some(capture) => source.with_capture(capture),
            None => source,
        }
    }
}

/// Open a previously captured stream for offline decoding
pub async fn open_capture_file<P: AsRef<Path>>(path: P) -> Result<StreamSource<tokio::fs::File>> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        SpektrumError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;
    info!("Reading captured stream from {}", path.display());
    Ok(StreamSource::new(file))
}

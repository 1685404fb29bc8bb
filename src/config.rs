//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SpektrumError};
use crate::reader::{LoopMode, Readiness, ReaderOptions};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the raw stream comes from and how the reader loops
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// "serial" or "file"
    #[serde(default = "default_source")]
    pub source: String,

    /// Capture file to replay when `source = "file"`
    #[serde(default)]
    pub file: String,

    /// Block until the first byte arrives before decoding
    #[serde(default = "default_wait_for_data")]
    pub wait_for_data: bool,

    /// Stop after the first session summary
    #[serde(default)]
    pub summary_only: bool,

    /// Align to the frame structure before the first frame
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Tried in order after `port`
    #[serde(default)]
    pub fallback_ports: Vec<String>,
}

/// Raw-capture configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_capture_path")]
    pub path: String,
}

/// Session tracking configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_gap_timeout_ms")]
    pub gap_timeout_ms: u64,
}

/// Frame decoding configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DecoderConfig {
    /// Discard first frames whose tx-info frame-count hint is zero
    #[serde(default)]
    pub reject_zero_frame_hint: bool,
}

/// Decoded frame output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// "text" or "jsonl"
    #[serde(default = "default_output_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Empty logs to stderr only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_source() -> String { "serial".to_string() }
fn default_wait_for_data() -> bool { true }
fn default_sync_on_start() -> bool { true }

fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }

fn default_capture_path() -> String { "capture.bin".to_string() }

fn default_gap_timeout_ms() -> u64 { 5000 }

fn default_output_format() -> String { "text".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            file: String::new(),
            wait_for_data: default_wait_for_data(),
            summary_only: false,
            sync_on_start: default_sync_on_start(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            fallback_ports: Vec::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_capture_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { gap_timeout_ms: default_gap_timeout_ms() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: default_output_format() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl InputConfig {
    pub fn is_serial(&self) -> bool {
        self.source == "serial"
    }

    /// Readiness policy; capture files are always ready
    pub fn readiness(&self) -> Readiness {
        if self.is_serial() && self.wait_for_data {
            Readiness::WaitForData
        } else {
            Readiness::Immediate
        }
    }

    pub fn loop_mode(&self) -> LoopMode {
        if self.summary_only {
            LoopMode::SummaryOnly
        } else {
            LoopMode::Continuous
        }
    }
}

impl SerialConfig {
    /// `port` followed by the fallbacks
    pub fn candidate_ports(&self) -> Vec<&str> {
        std::iter::once(self.port.as_str())
            .chain(self.fallback_ports.iter().map(String::as_str))
            .collect()
    }
}

impl SessionConfig {
    pub fn gap_timeout(&self) -> Duration {
        Duration::from_millis(self.gap_timeout_ms)
    }
}

impl Config {
    /// Reader settings derived from the input, session and decoder sections
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            readiness: self.input.readiness(),
            mode: self.input.loop_mode(),
            sync_on_start: self.input.sync_on_start,
            gap_timeout: self.session.gap_timeout(),
            reject_zero_frame_hint: self.decoder.reject_zero_frame_hint,
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
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
    /// use spektrum_sat::config::Config;
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
        // Validate input source
        match self.input.source.as_str() {
            "serial" => {
                if self.serial.port.is_empty() {
                    return Err(invalid("serial port cannot be empty"));
                }
            }
            "file" => {
                if self.input.file.is_empty() {
                    return Err(invalid("input file cannot be empty when source is 'file'"));
                }
            }
            _ => return Err(invalid("input source must be 'serial' or 'file'")),
        }

        if self.serial.fallback_ports.iter().any(String::is_empty) {
            return Err(invalid("fallback_ports cannot contain empty paths"));
        }

        // Validate baud rate
        if ![9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        // Validate capture configuration
        if self.capture.enabled && self.capture.path.is_empty() {
            return Err(invalid("capture path cannot be empty when enabled"));
        }

        // Validate session gap
        if self.session.gap_timeout_ms == 0 || self.session.gap_timeout_ms > 600_000 {
            return Err(invalid("gap_timeout_ms must be between 1 and 600000"));
        }

        // Validate output format
        if !["text", "jsonl"].contains(&self.output.format.as_str()) {
            return Err(invalid("output format must be 'text' or 'jsonl'"));
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> SpektrumError {
    SpektrumError::Config(toml::de::Error::custom(msg))
}

//! # Spektrum Sat
//!
//! Decode the raw serial stream of a Spektrum satellite receiver.
//!
//! Reads either a live serial port or a previously captured stream, prints a
//! summary of each reception session and then the channel values of every
//! decoded frame.

use anyhow::Result;
use std::io;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use spektrum_sat::config::{Config, LoggingConfig};
use spektrum_sat::output::{FrameSink, JsonLinesSink, TextSink};
use spektrum_sat::reader::{Reader, StopSignal};
use spektrum_sat::serial::{open_capture_file, CaptureSink, SatelliteSerial};

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "spektrum-sat.log";

/// Main entry point
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load the TOML configuration named by the first argument, or defaults
///    - Set up logging with tracing subscriber
///    - Install the Ctrl+C handler that trips the reader's stop signal
///
/// 2. **Decode**
///    - Serial input: open the port (and optional capture file), wait for
///      data, decode until stopped
///    - File input: replay the capture until end of stream
///
/// 3. **Shutdown**
///    - The reader flushes the capture file and the output on every exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - No serial device can be opened, or the capture file is missing
/// - Synchronization fails
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging);
    info!("Spektrum Sat v{} starting...", env!("CARGO_PKG_VERSION"));

    let (handle, mut stop) = StopSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            handle.stop();
        }
    });

    let mut sink: Box<dyn FrameSink> = match config.output.format.as_str() {
        "jsonl" => Box::new(JsonLinesSink::new(io::stdout())),
        _ => Box::new(TextSink::new(io::stdout())),
    };
    let mut reader = Reader::new(config.reader_options());

    let report = if config.input.is_serial() {
        let ports = config.serial.candidate_ports();
        let serial = SatelliteSerial::open_with_paths(&ports, config.serial.baud_rate)?;

        let capture = if config.capture.enabled {
            let capture = CaptureSink::create(&config.capture.path).await?;
            info!("Capturing raw stream to {}", config.capture.path);
            Some(capture)
        } else {
            None
        };

        let mut source = serial.into_source(capture);
        reader.run(&mut source, sink.as_mut(), &mut stop).await?
    } else {
        if config.capture.enabled {
            warn!("Capture files can only be created when reading from a serial device");
        }
        let mut source = open_capture_file(&config.input.file).await?;
        reader.run(&mut source, sink.as_mut(), &mut stop).await?
    };

    info!(
        "Reader finished ({:?}): {} decoded, {} discarded",
        report.exit, report.decoded, report.discarded
    );

    Ok(())
}

/// Install the tracing subscriber
///
/// Logs go to stderr, or to a daily rolling file when `log_dir` is set. The
/// returned guard must be held until exit so buffered file output is
/// flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        None
    } else {
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    }
}

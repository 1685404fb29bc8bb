//! # Reader
//!
//! The decode loop: synchronize, assemble, decode, count, hand off.
//!
//! One [`Reader`] covers both live serial input and capture replay. The
//! differences are configuration, not types:
//!
//! - [`Readiness`]: wait for the first byte before decoding, or start at once
//! - [`LoopMode`]: stop after the first session summary, or run until the
//!   stream ends
//!
//! A [`StopSignal`] is checked at the top of every iteration and raced
//! against every blocking read. The source is closed on every exit path.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::output::FrameSink;
use crate::serial::ByteSource;
use crate::spektrum::{decode, Assembly, DiscardReason, FrameAssembler, SessionTracker};

/// How the reader waits for the stream to come alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Block until at least one byte is available
    WaitForData,
    /// Start reading immediately
    Immediate,
}

/// When the reader stops looping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Return after the first frame of the first session
    SummaryOnly,
    /// Run until end of stream or cancellation
    Continuous,
}

/// Why the reader returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    EndOfStream,
    Cancelled,
    SummaryComplete,
}

/// Totals for one reader run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadReport {
    pub exit: ExitReason,
    /// Physical frames in the final session
    pub total_frames: u64,
    /// Logical frames decoded across all sessions
    pub decoded: u64,
    /// Assembly attempts that were dropped
    pub discarded: u64,
}

/// Trips a [`StopSignal`]
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Cooperative cancellation token for the reader
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// A linked handle and signal
    pub fn channel() -> (StopHandle, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopHandle(tx), StopSignal(rx))
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once stop is requested; never resolves if every handle is
    /// dropped first
    pub async fn stopped(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Reader settings
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub readiness: Readiness,
    pub mode: LoopMode,
    /// Synchronize before the first assembly attempt
    pub sync_on_start: bool,
    pub gap_timeout: Duration,
    pub reject_zero_frame_hint: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            readiness: Readiness::Immediate,
            mode: LoopMode::Continuous,
            sync_on_start: true,
            gap_timeout: crate::spektrum::session::DEFAULT_GAP_TIMEOUT,
            reject_zero_frame_hint: false,
        }
    }
}

/// Source of the instant stamped on each decoded frame
pub type Clock = Box<dyn Fn() -> Instant + Send + Sync>;

/// The decode loop over one byte source
pub struct Reader {
    options: ReaderOptions,
    assembler: FrameAssembler,
    session: SessionTracker,
    clock: Clock,
    decoded: u64,
    discarded: u64,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("options", &self.options)
            .field("session", &self.session)
            .field("decoded", &self.decoded)
            .field("discarded", &self.discarded)
            .finish_non_exhaustive()
    }
}

impl Reader {
    pub fn new(options: ReaderOptions) -> Self {
        let assembler = FrameAssembler::new().with_frame_hint_filter(options.reject_zero_frame_hint);
        let session = SessionTracker::new(options.gap_timeout);
        Self {
            options,
            assembler,
            session,
            clock: Box::new(Instant::now),
            decoded: 0,
            discarded: 0,
        }
    }

    /// Replace the wall clock used for session gap detection
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Fn() -> Instant + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Frame counter of the current session
    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// Decode `source` into `sink` until end of stream, cancellation or
    /// (in summary mode) the first session summary.
    ///
    /// The source is closed and the sink finished on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `SynchronizationFailure` when alignment cannot be found, and
    /// source, sink or close errors.
    pub async fn run<S, K>(&mut self, source: &mut S, sink: &mut K, stop: &mut StopSignal) -> Result<ReadReport>
    where
        S: ByteSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let outcome = self.run_loop(source, sink, stop).await;
        let closed = source.close().await;
        let finished = sink.finish(self.session.total_frames());

        let exit = outcome?;
        closed?;
        finished?;

        info!("Total of {} frames received and processed", self.session.total_frames());
        Ok(ReadReport {
            exit,
            total_frames: self.session.total_frames(),
            decoded: self.decoded,
            discarded: self.discarded,
        })
    }

    async fn run_loop<S, K>(&mut self, source: &mut S, sink: &mut K, stop: &mut StopSignal) -> Result<ExitReason>
    where
        S: ByteSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        if stop.is_stopped() {
            return Ok(ExitReason::Cancelled);
        }

        if self.options.readiness == Readiness::WaitForData {
            info!("Waiting for data to be available...");
            tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(ExitReason::Cancelled),
                ready = source.wait_ready() => ready?,
            }
            info!("Reading data...");
        }

        if self.options.sync_on_start {
            tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(ExitReason::Cancelled),
                synced = self.assembler.synchronize(source) => {
                    synced?;
                }
            }
        }

        loop {
            if stop.is_stopped() {
                return Ok(ExitReason::Cancelled);
            }

            let assembly = tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(ExitReason::Cancelled),
                assembly = self.assembler.next_frame(source) => assembly?,
            };

            match assembly {
                Assembly::Complete(frame) => {
                    let decoded = decode(&frame);
                    let new_session = self.session.record((self.clock)(), decoded.frames);
                    self.decoded += 1;

                    sink.on_frame(&decoded, new_session)?;

                    if new_session && self.options.mode == LoopMode::SummaryOnly {
                        return Ok(ExitReason::SummaryComplete);
                    }
                }
                Assembly::Discarded(reason) => {
                    self.discarded += 1;
                    match reason {
                        DiscardReason::Misaligned => warn!("Discarded misaligned frame"),
                        other => debug!("Discarded frame: {:?}", other),
                    }
                }
                Assembly::EndOfStream => {
                    debug!("End of stream");
                    return Ok(ExitReason::EndOfStream);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpektrumError;
    use crate::output::{JsonLinesSink, TextSink};
    use crate::serial::source::MockByteSource;
    use crate::serial::{CaptureSink, StreamSource};
    use crate::spektrum::decoder::DecodedFrame;
    use crate::spektrum::fixtures::{continuation_frame, pairs};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;

    /// Keeps every frame handed to it
    #[derive(Default)]
    struct CollectSink {
        frames: Vec<(DecodedFrame, bool)>,
        finished: Option<u64>,
    }

    impl FrameSink for CollectSink {
        fn on_frame(&mut self, frame: &DecodedFrame, new_session: bool) -> Result<()> {
            self.frames.push((frame.clone(), new_session));
            Ok(())
        }

        fn finish(&mut self, total_frames: u64) -> Result<()> {
            self.finished = Some(total_frames);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_continuous_run_to_end_of_stream() {
        let stream = pairs(6);
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();

        let report = Reader::new(ReaderOptions::default())
            .run(&mut source, &mut sink, &mut stop)
            .await
            .unwrap();

        // Sync consumes two pairs
        assert_eq!(report.exit, ExitReason::EndOfStream);
        assert_eq!(report.decoded, 4);
        assert_eq!(report.total_frames, 8);
        assert_eq!(report.discarded, 0);
        assert_eq!(sink.frames.len(), 4);
        assert!(sink.frames[0].1);
        assert!(sink.frames[1..].iter().all(|(_, new_session)| !new_session));
        assert_eq!(sink.finished, Some(8));
    }

    #[tokio::test]
    async fn test_summary_only_stops_after_first_frame() {
        let stream = pairs(6);
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = TextSink::new(Vec::new());
        let (_handle, mut stop) = StopSignal::channel();

        let options = ReaderOptions {
            mode: LoopMode::SummaryOnly,
            ..ReaderOptions::default()
        };
        let report = Reader::new(options).run(&mut source, &mut sink, &mut stop).await.unwrap();

        assert_eq!(report.exit, ExitReason::SummaryComplete);
        assert_eq!(report.decoded, 1);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("Bits per channel:      11"));
    }

    #[tokio::test]
    async fn test_trailing_partial_frame_is_discarded() {
        let mut stream = pairs(4);
        stream.extend_from_slice(&pairs(1)[..16]);
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = JsonLinesSink::new(Vec::new());
        let (_handle, mut stop) = StopSignal::channel();

        let report = Reader::new(ReaderOptions::default())
            .run(&mut source, &mut sink, &mut stop)
            .await
            .unwrap();

        assert_eq!(report.decoded, 2);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.total_frames, 4);
        assert_eq!(sink.records(), 2);
    }

    #[tokio::test]
    async fn test_without_initial_sync_recovers_from_misalignment() {
        let mut stream = continuation_frame().to_vec();
        stream.extend(pairs(4));
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();

        let options = ReaderOptions {
            sync_on_start: false,
            ..ReaderOptions::default()
        };
        let report = Reader::new(options).run(&mut source, &mut sink, &mut stop).await.unwrap();

        // One pair lands in the resync window, two remain after it
        assert_eq!(report.exit, ExitReason::EndOfStream);
        assert_eq!(report.decoded, 2);
        assert_eq!(sink.frames[0].0.highest_channel, 8);
    }

    #[tokio::test]
    async fn test_sync_failure_terminates_and_closes() {
        let stream: Vec<u8> = (0..=200u8).collect();
        let mut source = MockByteSource::new();
        let data = Bytes::from(stream);
        let mut pos = 0;
        source.expect_read_exact().returning(move |len| {
            let end = (pos + len).min(data.len());
            let chunk = data.slice(pos..end);
            pos = end;
            Ok(chunk)
        });
        source.expect_close().times(1).returning(|| Ok(()));

        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();
        let result = Reader::new(ReaderOptions::default())
            .run(&mut source, &mut sink, &mut stop)
            .await;

        assert!(matches!(result, Err(SpektrumError::SynchronizationFailure(_))));
        assert_eq!(sink.finished, Some(0));
    }

    #[tokio::test]
    async fn test_io_error_propagates_and_closes() {
        let mut source = MockByteSource::new();
        source
            .expect_read_exact()
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged")));
        source.expect_close().times(1).returning(|| Ok(()));

        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();
        let result = Reader::new(ReaderOptions::default())
            .run(&mut source, &mut sink, &mut stop)
            .await;

        assert!(matches!(result, Err(SpektrumError::Io(_))));
    }

    #[tokio::test]
    async fn test_stop_before_start_reads_nothing() {
        let mut source = MockByteSource::new();
        source.expect_read_exact().never();
        source.expect_wait_ready().never();
        source.expect_close().times(1).returning(|| Ok(()));

        let mut sink = CollectSink::default();
        let (handle, mut stop) = StopSignal::channel();
        handle.stop();

        let options = ReaderOptions {
            readiness: Readiness::WaitForData,
            ..ReaderOptions::default()
        };
        let report = Reader::new(options).run(&mut source, &mut sink, &mut stop).await.unwrap();
        assert_eq!(report.exit, ExitReason::Cancelled);
        assert_eq!(report.decoded, 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocked_read() {
        // Source that never produces data
        let (reader, _writer) = tokio::io::duplex(64);
        let mut source = StreamSource::new(reader);
        let mut sink = CollectSink::default();
        let (handle, mut stop) = StopSignal::channel();

        let options = ReaderOptions {
            readiness: Readiness::WaitForData,
            ..ReaderOptions::default()
        };
        let mut reader = Reader::new(options);
        let run = reader.run(&mut source, &mut sink, &mut stop);

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        };
        let (report, _) = tokio::join!(run, stopper);

        assert_eq!(report.unwrap().exit, ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_wait_for_data_then_decode() {
        let stream = pairs(4);
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();

        let options = ReaderOptions {
            readiness: Readiness::WaitForData,
            ..ReaderOptions::default()
        };
        let report = Reader::new(options).run(&mut source, &mut sink, &mut stop).await.unwrap();
        assert_eq!(report.decoded, 2);
    }

    #[tokio::test]
    async fn test_reception_gap_starts_new_session() {
        let stream = pairs(6);
        let mut source = StreamSource::new(&stream[..]);
        let mut sink = CollectSink::default();
        let (_handle, mut stop) = StopSignal::channel();

        // Third frame arrives six seconds after the second
        let start = Instant::now();
        let offsets_ms = [0u64, 22, 6022, 6044];
        let calls = AtomicUsize::new(0);
        let clock = move || {
            let call = calls.fetch_add(1, Ordering::SeqCst).min(offsets_ms.len() - 1);
            start + Duration::from_millis(offsets_ms[call])
        };

        let report = Reader::new(ReaderOptions::default())
            .with_clock(clock)
            .run(&mut source, &mut sink, &mut stop)
            .await
            .unwrap();

        let sessions: Vec<bool> = sink.frames.iter().map(|(_, new_session)| *new_session).collect();
        assert_eq!(sessions, vec![true, false, true, false]);
        assert_eq!(report.decoded, 4);
        assert_eq!(report.total_frames, 4);
        assert_eq!(sink.finished, Some(4));
    }

    #[tokio::test]
    async fn test_stop_mid_read_keeps_captured_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let (reader, mut writer) = tokio::io::duplex(64);
        let partial: Vec<u8> = (0u8..40).collect();
        writer.write_all(&partial).await.unwrap();

        let capture = CaptureSink::create(&path).await.unwrap();
        let mut source = StreamSource::new(reader).with_capture(capture);
        let mut sink = CollectSink::default();
        let (handle, mut stop) = StopSignal::channel();

        let mut reader = Reader::new(ReaderOptions::default());
        let run = reader.run(&mut source, &mut sink, &mut stop);
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            handle.stop();
        };
        let (report, _) = tokio::join!(run, stopper);

        assert_eq!(report.unwrap().exit, ExitReason::Cancelled);
        assert_eq!(source.bytes_read(), 40);
        assert_eq!(std::fs::read(&path).unwrap(), partial);
        drop(writer);
    }
}

//! # Frame Assembler
//!
//! Groups physical frames into logical frames.
//!
//! Each assembly attempt starts a fresh [`LogicalFrameBuilder`]. The builder
//! is dropped on any incompleteness; only a builder holding exactly
//! [`LOGICAL_PAYLOAD_SIZE`] payload bytes turns into a [`LogicalFrame`].

use tracing::{debug, warn};

use super::protocol::{RawFrame, TxInfo, FRAMES_REQUIRED, LOGICAL_PAYLOAD_SIZE, PHYSICAL_FRAME_SIZE};
use super::sync::{FrameSynchronizer, SyncPoint};
use crate::error::Result;
use crate::serial::ByteSource;

/// A complete logical frame, ready for channel decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFrame {
    dropped: u8,
    tx_info: TxInfo,
    payload: Vec<u8>,
}

impl LogicalFrame {
    /// Dropped-frame counter from the first physical frame
    pub fn dropped(&self) -> u8 {
        self.dropped
    }

    /// Tx-info byte from the first physical frame
    pub fn tx_info(&self) -> TxInfo {
        self.tx_info
    }

    /// Concatenated channel payload ([`LOGICAL_PAYLOAD_SIZE`] bytes)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Physical frames this logical frame was built from
    pub fn frames_required(&self) -> usize {
        FRAMES_REQUIRED
    }
}

/// Short-lived accumulator for one assembly attempt
#[derive(Debug, Clone)]
pub struct LogicalFrameBuilder {
    dropped: u8,
    tx_info: TxInfo,
    payload: Vec<u8>,
    frames: usize,
}

impl LogicalFrameBuilder {
    /// Start a logical frame from its first physical frame
    pub fn new(first: &RawFrame) -> Self {
        let mut payload = Vec::with_capacity(LOGICAL_PAYLOAD_SIZE);
        payload.extend_from_slice(first.payload());
        Self {
            dropped: first.dropped(),
            tx_info: first.tx_info(),
            payload,
            frames: 1,
        }
    }

    /// Append the payload of a following physical frame
    pub fn push(&mut self, frame: &RawFrame) {
        self.payload.extend_from_slice(frame.payload());
        self.frames += 1;
    }

    /// Physical frames accumulated so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_complete(&self) -> bool {
        self.payload.len() == LOGICAL_PAYLOAD_SIZE
    }

    /// Finish the attempt.
    ///
    /// Returns the accumulated payload length as the error when the frame
    /// is incomplete.
    pub fn finish(self) -> std::result::Result<LogicalFrame, usize> {
        if !self.is_complete() {
            return Err(self.payload.len());
        }
        Ok(LogicalFrame {
            dropped: self.dropped,
            tx_info: self.tx_info,
            payload: self.payload,
        })
    }
}

/// Why an assembly attempt produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Source ended before all physical frames arrived
    Incomplete { payload_len: usize },
    /// Still on a continuation frame after resynchronizing
    Misaligned,
    /// Tx-info frame-count hint was zero (only with the hint filter on)
    UnreliableFrameHint { tx_info: u8 },
}

/// Result of one assembly attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    Complete(LogicalFrame),
    Discarded(DiscardReason),
    EndOfStream,
}

/// Reads physical frames and groups them into logical frames
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    synchronizer: FrameSynchronizer,
    reject_zero_frame_hint: bool,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard first frames whose tx-info low two bits are zero
    pub fn with_frame_hint_filter(mut self, enabled: bool) -> Self {
        self.reject_zero_frame_hint = enabled;
        self
    }

    /// Align `source` to the start of a logical frame
    pub async fn synchronize<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<SyncPoint> {
        self.synchronizer.synchronize(source).await
    }

    /// Assemble the next logical frame
    ///
    /// # Errors
    ///
    /// Returns `SynchronizationFailure` when a misaligned stream cannot be
    /// resynchronized, and passes source I/O errors through. End of stream
    /// and discarded frames are reported as [`Assembly`] outcomes.
    pub async fn next_frame<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<Assembly> {
        let mut resynced = false;

        loop {
            let first = match read_frame(source).await? {
                Some(frame) => frame,
                None => return Ok(Assembly::EndOfStream),
            };

            if first.is_continuation() {
                if resynced {
                    debug!("Continuation frame again after resync, discarding");
                    return Ok(Assembly::Discarded(DiscardReason::Misaligned));
                }
                warn!(
                    "Probable second frame at start of logical frame [0x{:02X}], resynchronizing",
                    first.payload()[0]
                );
                self.synchronizer.synchronize(source).await?;
                resynced = true;
                continue;
            }

            if self.reject_zero_frame_hint && first.tx_info().frame_count_hint() == 0 {
                debug!("Likely invalid frame (tx-info 0x{:02X})", first.tx_info().raw());
                return Ok(Assembly::Discarded(DiscardReason::UnreliableFrameHint {
                    tx_info: first.tx_info().raw(),
                }));
            }

            let mut builder = LogicalFrameBuilder::new(&first);
            while builder.frames() < FRAMES_REQUIRED {
                match read_frame(source).await? {
                    Some(frame) => builder.push(&frame),
                    None => break,
                }
            }

            return Ok(match builder.finish() {
                Ok(frame) => Assembly::Complete(frame),
                Err(payload_len) => Assembly::Discarded(DiscardReason::Incomplete { payload_len }),
            });
        }
    }
}

/// Read one physical frame; `None` on a short read
async fn read_frame<S: ByteSource + ?Sized>(source: &mut S) -> Result<Option<RawFrame>> {
    let chunk = source.read_exact(PHYSICAL_FRAME_SIZE).await?;
    Ok(RawFrame::from_slice(&chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpektrumError;
    use crate::serial::StreamSource;
    use crate::spektrum::fixtures::{continuation_frame, first_frame, frame, pairs, slot_10, TX_INFO_10};

    #[test]
    fn test_builder_completes_with_two_frames() {
        let first = RawFrame::from_slice(&first_frame()).unwrap();
        let second = RawFrame::from_slice(&continuation_frame()).unwrap();

        let mut builder = LogicalFrameBuilder::new(&first);
        assert!(!builder.is_complete());
        builder.push(&second);
        assert!(builder.is_complete());

        let logical = builder.finish().unwrap();
        assert_eq!(logical.payload().len(), LOGICAL_PAYLOAD_SIZE);
        assert_eq!(&logical.payload()[..14], first.payload());
        assert_eq!(&logical.payload()[14..], second.payload());
        assert_eq!(logical.frames_required(), 2);
    }

    #[test]
    fn test_builder_rejects_overlong_payload() {
        let first = RawFrame::from_slice(&first_frame()).unwrap();
        let second = RawFrame::from_slice(&continuation_frame()).unwrap();

        let mut builder = LogicalFrameBuilder::new(&first);
        builder.push(&second);
        builder.push(&second);
        assert_eq!(builder.finish().unwrap_err(), 42);
    }

    #[tokio::test]
    async fn test_assembles_consecutive_frames() {
        let stream = pairs(3);
        let mut source = StreamSource::new(&stream[..]);
        let mut assembler = FrameAssembler::new();

        for _ in 0..3 {
            match assembler.next_frame(&mut source).await.unwrap() {
                Assembly::Complete(frame) => {
                    assert_eq!(frame.dropped(), 0);
                    assert_eq!(frame.tx_info().channel_bits(), 11);
                }
                other => panic!("Expected complete frame, got: {:?}", other),
            }
        }
        assert_eq!(assembler.next_frame(&mut source).await.unwrap(), Assembly::EndOfStream);
    }

    #[tokio::test]
    async fn test_single_frame_before_eof_is_incomplete() {
        let stream = frame(0, TX_INFO_10, &[slot_10(0, 300)]);
        let mut source = StreamSource::new(&stream[..]);
        let mut assembler = FrameAssembler::new();

        assert_eq!(
            assembler.next_frame(&mut source).await.unwrap(),
            Assembly::Discarded(DiscardReason::Incomplete { payload_len: 14 })
        );
        assert_eq!(assembler.next_frame(&mut source).await.unwrap(), Assembly::EndOfStream);
    }

    #[tokio::test]
    async fn test_partial_second_frame_is_incomplete() {
        let mut stream = first_frame().to_vec();
        stream.extend_from_slice(&continuation_frame()[..9]);
        let mut source = StreamSource::new(&stream[..]);

        assert_eq!(
            FrameAssembler::new().next_frame(&mut source).await.unwrap(),
            Assembly::Discarded(DiscardReason::Incomplete { payload_len: 14 })
        );
    }

    #[tokio::test]
    async fn test_empty_source_is_end_of_stream() {
        let empty: &[u8] = &[];
        let mut source = StreamSource::new(empty);
        assert_eq!(
            FrameAssembler::new().next_frame(&mut source).await.unwrap(),
            Assembly::EndOfStream
        );
    }

    #[tokio::test]
    async fn test_misaligned_start_resynchronizes() {
        let mut stream = continuation_frame().to_vec();
        stream.extend(pairs(4));
        let mut source = StreamSource::new(&stream[..]);

        match FrameAssembler::new().next_frame(&mut source).await.unwrap() {
            Assembly::Complete(frame) => {
                assert_eq!(&frame.payload()[..14], &first_frame()[2..]);
                assert_eq!(&frame.payload()[14..], &continuation_frame()[2..]);
            }
            other => panic!("Expected complete frame, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_resync_is_synchronization_failure() {
        let mut stream = continuation_frame().to_vec();
        stream.extend((0..=120u8).collect::<Vec<u8>>());
        let mut source = StreamSource::new(&stream[..]);

        let result = FrameAssembler::new().next_frame(&mut source).await;
        assert!(matches!(result, Err(SpektrumError::SynchronizationFailure(_))));
    }

    #[tokio::test]
    async fn test_frame_hint_filter() {
        // 0x14 has a zero frame-count hint
        let stream = pairs(1);
        let mut source = StreamSource::new(&stream[..]);
        let mut assembler = FrameAssembler::new().with_frame_hint_filter(true);

        assert_eq!(
            assembler.next_frame(&mut source).await.unwrap(),
            Assembly::Discarded(DiscardReason::UnreliableFrameHint { tx_info: 0x14 })
        );
    }

    #[tokio::test]
    async fn test_frame_hint_ignored_by_default() {
        let stream = pairs(1);
        let mut source = StreamSource::new(&stream[..]);

        assert!(matches!(
            FrameAssembler::new().next_frame(&mut source).await.unwrap(),
            Assembly::Complete(_)
        ));
    }
}

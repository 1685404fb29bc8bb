//! # Frame Synchronizer
//!
//! Recovers physical-frame alignment in the unmarked satellite stream.
//!
//! The stream has no sync byte. What it does have is structure: a logical
//! frame is 32 bytes and, while the sticks are still, repeats byte for byte.
//! The synchronizer looks for the first offset where
//!
//! - the byte is not idle padding (`0xFF`),
//! - the byte repeats one physical frame later (the dropped-frame counter is
//!   copied into both halves of a pair), and
//! - the whole 32-byte window repeats 32 bytes later.
//!
//! The scan is bounded to [`MAX_SCAN_OFFSETS`] candidate offsets. Running
//! out of offsets is a synchronization failure, never a retry loop.

use bytes::BytesMut;
use tracing::debug;

use super::protocol::{IDLE_BYTE, PAYLOAD_OFFSET, PHASE_FLAG, PHYSICAL_FRAME_SIZE};
use crate::error::{Result, SpektrumError};
use crate::serial::ByteSource;

/// Length of the structural period (one logical frame)
pub const STRUCTURE_PERIOD: usize = 2 * PHYSICAL_FRAME_SIZE;

/// Bytes read before scanning (two structural periods)
pub const SCAN_WINDOW: usize = 2 * STRUCTURE_PERIOD;

/// Candidate offsets tried per invocation
pub const MAX_SCAN_OFFSETS: usize = STRUCTURE_PERIOD;

/// Where the synchronizer locked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    /// Offset into the scanned bytes of the first repeating frame
    pub offset: usize,
    /// A continuation frame was discarded so the next read starts a pair
    pub skipped_continuation: bool,
    /// Bytes consumed from the source by this invocation
    pub bytes_consumed: usize,
}

/// Bounded scanner for the repeating 32-byte frame structure
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    buf: BytesMut,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(SCAN_WINDOW + MAX_SCAN_OFFSETS + PHYSICAL_FRAME_SIZE),
        }
    }

    /// Align subsequent reads from `source` to the first frame of a pair
    ///
    /// # Errors
    ///
    /// Returns `SynchronizationFailure` if the source runs dry during the
    /// scan or no offset in the bounded range shows the repeating
    /// structure. I/O errors from the source are passed through.
    pub async fn synchronize<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<SyncPoint> {
        self.buf.clear();
        self.fill(source, SCAN_WINDOW).await?;

        let mut offset = 0;
        while offset < MAX_SCAN_OFFSETS && self.buf[offset] == IDLE_BYTE {
            offset += 1;
            if offset < MAX_SCAN_OFFSETS {
                self.fill(source, 1).await?;
            }
        }

        while offset < MAX_SCAN_OFFSETS {
            if self.matches_at(offset) {
                return self.lock(source, offset).await;
            }
            offset += 1;
            if offset < MAX_SCAN_OFFSETS {
                self.fill(source, 1).await?;
            }
        }

        Err(SpektrumError::SynchronizationFailure(format!(
            "no repeating {}-byte structure within {} offsets",
            STRUCTURE_PERIOD, MAX_SCAN_OFFSETS
        )))
    }

    /// Structural match test; the buffer always holds `offset + 64` bytes
    fn matches_at(&self, offset: usize) -> bool {
        let buf = &self.buf;
        buf[offset] != IDLE_BYTE
            && buf[offset] == buf[offset + PHYSICAL_FRAME_SIZE]
            && buf[offset..offset + STRUCTURE_PERIOD]
                == buf[offset + STRUCTURE_PERIOD..offset + SCAN_WINDOW]
    }

    async fn lock<S: ByteSource + ?Sized>(&mut self, source: &mut S, offset: usize) -> Result<SyncPoint> {
        // The source sits a whole number of frames past `offset`, so it is
        // in the same half of the pair as the matched frame.
        let skipped_continuation = self.buf[offset + PAYLOAD_OFFSET] & PHASE_FLAG != 0;
        if skipped_continuation {
            self.fill(source, PHYSICAL_FRAME_SIZE).await?;
        }

        let point = SyncPoint {
            offset,
            skipped_continuation,
            bytes_consumed: self.buf.len(),
        };
        debug!(
            "Synchronized at offset {} (skipped continuation: {}, consumed {} bytes)",
            point.offset, point.skipped_continuation, point.bytes_consumed
        );
        Ok(point)
    }

    async fn fill<S: ByteSource + ?Sized>(&mut self, source: &mut S, len: usize) -> Result<()> {
        let chunk = source.read_exact(len).await?;
        if chunk.len() < len {
            return Err(SpektrumError::SynchronizationFailure(format!(
                "source exhausted after {} bytes while scanning",
                self.buf.len() + chunk.len()
            )));
        }
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }
}

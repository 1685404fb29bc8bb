//! # Session Tracker
//!
//! Counts processed physical frames and starts a new session after a
//! reception gap.

use std::time::{Duration, Instant};
use tracing::info;

/// Default gap after which the frame count restarts
pub const DEFAULT_GAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame counter with gap detection
///
/// The current instant is passed in by the caller so the gap logic can be
/// driven with simulated time.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    gap_timeout: Duration,
    total_frames: u64,
    last_frame_time: Option<Instant>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_TIMEOUT)
    }
}

impl SessionTracker {
    pub fn new(gap_timeout: Duration) -> Self {
        Self {
            gap_timeout,
            total_frames: 0,
            last_frame_time: None,
        }
    }

    /// Record a decoded logical frame made of `frames` physical frames.
    ///
    /// Returns `true` when this frame starts a new session, either the very
    /// first frame or the first after a gap longer than the timeout.
    pub fn record(&mut self, now: Instant, frames: usize) -> bool {
        if self.total_frames > 0 && self.gap_exceeded(now) {
            info!("Break in reception detected. Resetting frame counter.");
            self.total_frames = 0;
        }

        let new_session = self.total_frames == 0;
        self.total_frames += frames as u64;
        self.last_frame_time = Some(now);
        new_session
    }

    fn gap_exceeded(&self, now: Instant) -> bool {
        match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last) > self.gap_timeout,
            None => false,
        }
    }

    /// Physical frames processed in the current session
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Time of the most recent decoded frame
    pub fn last_frame_time(&self) -> Option<Instant> {
        self.last_frame_time
    }

    pub fn gap_timeout(&self) -> Duration {
        self.gap_timeout
    }
}

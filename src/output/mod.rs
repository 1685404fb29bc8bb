//! # Output Module
//!
//! Consumers for decoded frames.
//!
//! This module handles:
//! - Rendering a session summary and a channel table as text
//! - Writing one JSON record per decoded frame (JSON Lines)

pub mod record;

pub use record::FrameRecord;

use std::io::Write;

use chrono::Utc;

use crate::error::Result;
use crate::spektrum::decoder::DecodedFrame;

/// Receives every decoded logical frame from the reader
pub trait FrameSink {
    /// Handle one frame; `new_session` is set for the first frame of a
    /// session
    fn on_frame(&mut self, frame: &DecodedFrame, new_session: bool) -> Result<()>;

    /// Called once when the reader exits
    fn finish(&mut self, _total_frames: u64) -> Result<()> {
        Ok(())
    }
}

/// Multi-line description of a frame's header, printed once per session
pub fn session_summary(frame: &DecodedFrame) -> String {
    let info = frame.tx_info;
    format!(
        "Dropped:               {}\n\
         Transmitter data byte: 0x{:02x}  {:08b}\n\
         Bits per channel:      {}\n\
         Frames required:       {}\n\
         Highest channel:       {}\n\
         \x20 TX number:           {}\n\
         \x20 Upper 3 bits:        0x{:02x}\n\
         \x20 Lower 2 bits:        0x{:02x}",
        frame.dropped,
        info.raw(),
        info.raw(),
        info.channel_bits(),
        frame.frames,
        frame.highest_channel,
        info.tx_number(),
        info.upper_bits(),
        info.lower_bits(),
    )
}

/// Three-line table of raw channel values, channel 0 to the highest seen
pub fn channel_table(frame: &DecodedFrame) -> String {
    let channels = 0..=frame.highest_channel;

    let title: String = channels.clone().map(|c| format!("  {:2} ", c)).collect();
    let rule: String = channels.clone().map(|_| "---- ").collect();
    let values: String = channels
        .map(|c| format!("{:4} ", frame.channels.get(&c).copied().unwrap_or(0)))
        .collect();

    format!("{}\n{}\n{}", title, rule, values)
}

/// Human-readable text output
#[derive(Debug)]
pub struct TextSink<W> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for TextSink<W> {
    fn on_frame(&mut self, frame: &DecodedFrame, new_session: bool) -> Result<()> {
        if new_session {
            writeln!(self.out, "\n{}\n", session_summary(frame))?;
        } else {
            writeln!(self.out, "{}", channel_table(frame))?;
        }
        Ok(())
    }

    fn finish(&mut self, total_frames: u64) -> Result<()> {
        writeln!(self.out, "\nTotal of {} frames received and processed.", total_frames)?;
        self.out.flush()?;
        Ok(())
    }
}

/// JSON Lines output, one [`FrameRecord`] per line
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: W,
    records: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn on_frame(&mut self, frame: &DecodedFrame, new_session: bool) -> Result<()> {
        let record = FrameRecord::new(frame, Utc::now(), new_session);
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self, _total_frames: u64) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

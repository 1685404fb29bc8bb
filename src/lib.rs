//! # Spektrum Sat Library
//!
//! Decode the raw serial stream of a Spektrum satellite receiver into
//! per-channel control values.
//!
//! The stream carries no start-of-frame marker. This library recovers frame
//! alignment from the stream's periodic structure, reassembles the two
//! physical frames that form each logical frame, and decodes the packed
//! 10-bit or 11-bit channel slots.

pub mod config;
pub mod error;
pub mod output;
pub mod reader;
pub mod serial;
pub mod spektrum;

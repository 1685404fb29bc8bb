//! # Spektrum Satellite Module
//!
//! Decoder for the raw serial stream of a Spektrum satellite receiver.
//!
//! This module handles:
//! - Frame synchronization on an unmarked byte stream
//! - Reassembly of two physical frames into one logical frame
//! - 10-bit and 11-bit channel slot decoding, including the 10-bit
//!   failsafe encoding
//! - Session frame counting across reception gaps

pub mod protocol;
pub mod sync;
pub mod assembler;
pub mod decoder;
pub mod session;

pub use assembler::{Assembly, DiscardReason, FrameAssembler, LogicalFrame};
pub use decoder::{decode, DecodedFrame};
pub use session::SessionTracker;
pub use sync::{FrameSynchronizer, SyncPoint};

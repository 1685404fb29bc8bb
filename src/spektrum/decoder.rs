//! # Channel Decoder
//!
//! Turns a complete logical frame into channel values.
//!
//! Every 2-byte slot carries a channel id and value packed into a 16-bit
//! big-endian word:
//!
//! ```text
//! 11-bit:  F CCCC VVV VVVVVVVV   id = (b0 & 0x78) >> 3, value = w & 0x7FF
//! 10-bit:  F X CCCC VV VVVVVVVV  id = (b0 & 0x3C) >> 2, value = w & 0x3FF
//! ```
//!
//! `F` is the phase flag. It is reported per slot but never feeds the id or
//! value. A slot whose first byte is `0xFF` is unused.
//!
//! In 10-bit mode each output channel owns a pair of slots. A zero in the
//! even slot means the real value sits in the odd slot, offset by 1024.

use std::collections::BTreeMap;

use super::assembler::LogicalFrame;
use super::protocol::{ChannelResolution, TxInfo, FALLBACK_OFFSET, IDLE_BYTE, PHASE_FLAG};

/// Channel index to raw masked value
pub type ChannelMap = BTreeMap<u8, u16>;

/// One decoded 2-byte slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSlot {
    pub channel: u8,
    pub value: u16,
    /// High bit of the slot's first byte
    pub phase: bool,
}

/// Decoded contents of one logical frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Dropped-frame counter
    pub dropped: u8,
    /// Tx-info byte
    pub tx_info: TxInfo,
    /// Highest channel id seen in the frame (0 when no slot was used)
    pub highest_channel: u8,
    /// Raw channel values, last write wins
    pub channels: ChannelMap,
    /// Derived per-pair values; only present for 10-bit frames
    pub final_values: Option<ChannelMap>,
    /// Every used slot in payload order
    pub slots: Vec<ChannelSlot>,
    /// Physical frames the logical frame was built from
    pub frames: usize,
}

impl DecodedFrame {
    pub fn resolution(&self) -> ChannelResolution {
        self.tx_info.resolution()
    }

    pub fn channel_bits(&self) -> u8 {
        self.tx_info.channel_bits()
    }

    pub fn tx_number(&self) -> u8 {
        self.tx_info.tx_number()
    }
}

/// Decode one slot; `None` for an unused slot
pub fn decode_slot(byte0: u8, byte1: u8, resolution: ChannelResolution) -> Option<ChannelSlot> {
    if byte0 == IDLE_BYTE {
        return None;
    }

    let word = u16::from_be_bytes([byte0, byte1]);
    Some(ChannelSlot {
        channel: resolution.channel_id(byte0),
        value: word & resolution.value_mask(),
        phase: byte0 & PHASE_FLAG != 0,
    })
}

/// Iterate the used slots of a payload
pub fn slots(payload: &[u8], resolution: ChannelResolution) -> impl Iterator<Item = ChannelSlot> + '_ {
    payload
        .chunks_exact(2)
        .filter_map(move |pair| decode_slot(pair[0], pair[1], resolution))
}

/// Build the channel map and highest channel id from decoded slots
///
/// Slots are applied in order, so a repeated channel keeps its last value.
pub fn channel_map(slots: &[ChannelSlot]) -> (ChannelMap, u8) {
    let mut channels = ChannelMap::new();
    let mut highest = 0;

    for slot in slots {
        highest = highest.max(slot.channel);
        channels.insert(slot.channel, slot.value);
    }

    (channels, highest)
}

/// Build the channel map and highest channel id from a payload
pub fn decode_channels(payload: &[u8], resolution: ChannelResolution) -> (ChannelMap, u8) {
    let slots: Vec<ChannelSlot> = slots(payload, resolution).collect();
    channel_map(&slots)
}

/// Derive 10-bit output values from slot pairs
///
/// For each even slot `n` up to `highest`, output channel `n / 2` takes
/// `channels[n]`, or `1024 + channels[n + 1]` when `channels[n]` is missing
/// or exactly zero.
pub fn derive_final_values(channels: &ChannelMap, highest: u8) -> ChannelMap {
    let mut final_values = ChannelMap::new();

    for n in (0..=highest).step_by(2) {
        let value = match channels.get(&n) {
            Some(&value) if value != 0 => value,
            _ => FALLBACK_OFFSET + channels.get(&(n + 1)).copied().unwrap_or(0),
        };
        final_values.insert(n / 2, value);
    }

    final_values
}

/// Decode a complete logical frame
pub fn decode(frame: &LogicalFrame) -> DecodedFrame {
    let tx_info = frame.tx_info();
    let resolution = tx_info.resolution();
    let slots: Vec<ChannelSlot> = slots(frame.payload(), resolution).collect();
    let (channels, highest_channel) = channel_map(&slots);

    let final_values = match resolution {
        ChannelResolution::TenBit => Some(derive_final_values(&channels, highest_channel)),
        ChannelResolution::ElevenBit => None,
    };

    DecodedFrame {
        dropped: frame.dropped(),
        tx_info,
        highest_channel,
        channels,
        final_values,
        slots,
        frames: frame.frames_required(),
    }
}

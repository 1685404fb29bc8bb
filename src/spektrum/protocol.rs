//! # Spektrum Satellite Protocol Constants and Types
//!
//! Core wire definitions for the satellite receiver serial stream.
//!
//! A physical frame is 16 bytes:
//!
//! ```text
//! +---------+---------+------------------------------+
//! | dropped | tx-info | 7 channel slots (14 bytes)   |
//! +---------+---------+------------------------------+
//! ```
//!
//! Two physical frames make up one logical frame.

/// Size of one physical frame in bytes
pub const PHYSICAL_FRAME_SIZE: usize = 16;

/// Channel payload bytes carried by one physical frame
pub const FRAME_PAYLOAD_SIZE: usize = 14;

/// Offset of the payload within a physical frame
pub const PAYLOAD_OFFSET: usize = 2;

/// Physical frames per logical frame.
///
/// Fixed policy: the tx-info low two bits look like a frame count but are
/// too unreliable to trust on real streams.
pub const FRAMES_REQUIRED: usize = 2;

/// Payload size of a complete logical frame (28 bytes)
pub const LOGICAL_PAYLOAD_SIZE: usize = FRAMES_REQUIRED * FRAME_PAYLOAD_SIZE;

/// Idle/padding byte, also marks an unused channel slot
pub const IDLE_BYTE: u8 = 0xFF;

/// High bit of a slot's first byte: phase flag, set on continuation frames
pub const PHASE_FLAG: u8 = 0x80;

/// Resolution flag in the tx-info byte
pub const TX_INFO_11_BIT_FLAG: u8 = 0x10;

/// Number of addressable channels (4-bit channel id)
pub const MAX_CHANNELS: usize = 16;

/// Offset added to the neighbouring slot in the 10-bit failsafe encoding
pub const FALLBACK_OFFSET: u16 = 1024;

/// Channel value resolution announced by the tx-info byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelResolution {
    /// 10-bit values, 4-bit channel id at `0x3C`
    TenBit,
    /// 11-bit values, 4-bit channel id at `0x78`
    ElevenBit,
}

impl ChannelResolution {
    /// Bits per channel value (10 or 11)
    pub fn bits(self) -> u8 {
        match self {
            Self::TenBit => 10,
            Self::ElevenBit => 11,
        }
    }

    /// Mask applied to the 16-bit slot composite
    pub fn value_mask(self) -> u16 {
        match self {
            Self::TenBit => 0x03FF,
            Self::ElevenBit => 0x07FF,
        }
    }

    /// Extract the channel id from a slot's first byte
    pub fn channel_id(self, byte0: u8) -> u8 {
        match self {
            Self::TenBit => (byte0 & 0x3C) >> 2,
            Self::ElevenBit => (byte0 & 0x78) >> 3,
        }
    }
}

/// The tx-info byte (byte 1 of the first physical frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo(pub u8);

impl TxInfo {
    /// Raw byte value
    pub fn raw(self) -> u8 {
        self.0
    }

    /// 11-bit when `0x10` is set, otherwise 10-bit
    pub fn resolution(self) -> ChannelResolution {
        if self.0 & TX_INFO_11_BIT_FLAG == 0 {
            ChannelResolution::TenBit
        } else {
            ChannelResolution::ElevenBit
        }
    }

    /// Bits per channel value (10 or 11)
    pub fn channel_bits(self) -> u8 {
        self.resolution().bits()
    }

    /// Transmitter number (upper six bits)
    pub fn tx_number(self) -> u8 {
        self.0 >> 2
    }

    /// Low two bits, historically read as a frame count
    pub fn frame_count_hint(self) -> u8 {
        self.0 & 0x03
    }

    /// Bits 5..=7, shown in session summaries
    pub fn upper_bits(self) -> u8 {
        (self.0 & 0xE0) >> 5
    }

    /// Bits 2..=3, shown in session summaries
    pub fn lower_bits(self) -> u8 {
        (self.0 & 0x0C) >> 2
    }
}

/// One 16-byte physical frame as read from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame([u8; PHYSICAL_FRAME_SIZE]);

impl RawFrame {
    /// Build a raw frame from a slice.
    ///
    /// Returns `None` unless `bytes` is exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; PHYSICAL_FRAME_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Dropped-frame counter
    pub fn dropped(&self) -> u8 {
        self.0[0]
    }

    /// Tx-info byte
    pub fn tx_info(&self) -> TxInfo {
        TxInfo(self.0[1])
    }

    /// 14 bytes of channel payload
    pub fn payload(&self) -> &[u8] {
        &self.0[PAYLOAD_OFFSET..]
    }

    /// True when the first slot carries the phase flag, i.e. this frame
    /// is the second half of a logical pair
    pub fn is_continuation(&self) -> bool {
        self.0[PAYLOAD_OFFSET] & PHASE_FLAG != 0
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PHYSICAL_FRAME_SIZE] {
        &self.0
    }
}

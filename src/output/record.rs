//! Serializable decoded-frame record

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::spektrum::decoder::{ChannelMap, DecodedFrame};

/// One decoded logical frame as handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    /// RFC 3339 receive time
    pub received_at: String,
    /// First frame of a new session
    pub new_session: bool,
    pub dropped: u8,
    pub tx_number: u8,
    /// 10 or 11
    pub channel_bits: u8,
    /// Raw channel values by channel index
    pub channels: ChannelMap,
    /// Derived values by output channel; 10-bit frames only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_values: Option<ChannelMap>,
}

impl FrameRecord {
    pub fn new(frame: &DecodedFrame, received_at: DateTime<Utc>, new_session: bool) -> Self {
        Self {
            received_at: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            new_session,
            dropped: frame.dropped,
            tx_number: frame.tx_number(),
            channel_bits: frame.channel_bits(),
            channels: frame.channels.clone(),
            final_values: frame.final_values.clone(),
        }
    }
}

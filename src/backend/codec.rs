//! Decode engine trait and protocol counters
//!
//! A decode engine owns the framing of the byte stream. On each runner tick
//! it drains what the transport has buffered and hands every decoded
//! [`Sample`] to a callback, in decode order.

use super::transport::Transport;
use crate::error::Result;
use crate::types::{Payload, PayloadType, Sample};
use std::fmt;

/// Reason a received frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corruption {
    /// Frame carried no content
    Empty,
    /// Topic without a value
    MissingValue,
    /// Malformed `topic[index]` addressing
    BadIndex,
    /// Frame bytes are not UTF-8
    InvalidUtf8,
    /// Frame exceeded the maximum length before a terminator was seen
    Overflow,
}

impl Corruption {
    pub const ALL: [Corruption; 5] = [
        Corruption::Empty,
        Corruption::MissingValue,
        Corruption::BadIndex,
        Corruption::InvalidUtf8,
        Corruption::Overflow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Corruption::Empty => "empty",
            Corruption::MissingValue => "missing_value",
            Corruption::BadIndex => "bad_index",
            Corruption::InvalidUtf8 => "invalid_utf8",
            Corruption::Overflow => "overflow",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Corruption::Empty => 0,
            Corruption::MissingValue => 1,
            Corruption::BadIndex => 2,
            Corruption::InvalidUtf8 => 3,
            Corruption::Overflow => 4,
        }
    }
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Framing-level counters of a decode engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    /// Frames decoded into samples
    pub rx_frames: u64,
    /// Frames published
    pub tx_frames: u64,
    /// Publish attempts rejected before reaching the transport
    pub tx_rejected: u64,
    corrupted: [u64; 5],
}

impl ProtocolStats {
    /// Count one discarded frame
    pub fn record_corruption(&mut self, kind: Corruption) {
        self.corrupted[kind.slot()] += 1;
    }

    /// Discarded frames of one category
    pub fn corrupted(&self, kind: Corruption) -> u64 {
        self.corrupted[kind.slot()]
    }

    /// Discarded frames of all categories
    pub fn total_corrupted(&self) -> u64 {
        self.corrupted.iter().sum()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Protocol layer between a transport and the topic store
pub trait DecodeEngine: Send {
    /// Drain pending bytes from `transport` and emit every complete sample
    /// through `on_sample`, in decode order.
    fn update(
        &mut self,
        transport: &mut dyn Transport,
        on_sample: &mut dyn FnMut(Sample),
    ) -> Result<()>;

    /// Encode `value` as `payload_type` and write it on `topic`
    fn publish(
        &mut self,
        transport: &mut dyn Transport,
        topic: &str,
        value: &Payload,
        payload_type: PayloadType,
    ) -> Result<()>;

    /// Framing counters
    fn stats(&self) -> ProtocolStats;

    /// Zero the framing counters
    fn reset_stats(&mut self);

    /// Drop any partially received frame. Called when a new link is
    /// opened, so bytes of the previous link never reach the next session.
    fn reset(&mut self);
}

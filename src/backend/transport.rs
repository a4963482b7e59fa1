//! Transport trait for byte-stream links
//!
//! A transport moves raw bytes to and from the device. It knows nothing
//! about topics or framing: the [`DecodeEngine`](super::codec::DecodeEngine)
//! sits on top and turns bytes into samples.

use crate::error::Result;
use crate::types::ConnectOptions;

/// Cumulative byte counters of a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes received since the last reset
    pub rx_bytes: u64,
    /// Bytes written since the last reset
    pub tx_bytes: u64,
    /// Non-empty reads since the last reset
    pub rx_chunks: u64,
    /// Writes since the last reset
    pub tx_chunks: u64,
}

impl TransportStats {
    /// Account for a read of `bytes` bytes
    pub fn record_rx(&mut self, bytes: usize) {
        if bytes > 0 {
            self.rx_bytes += bytes as u64;
            self.rx_chunks += 1;
        }
    }

    /// Account for a write of `bytes` bytes
    pub fn record_tx(&mut self, bytes: usize) {
        self.tx_bytes += bytes as u64;
        self.tx_chunks += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unified interface for device links
///
/// Implementations must be `Send`: the runner thread reads while the
/// console thread may write through the same link.
///
/// `read` never blocks for long. It returns whatever is available within the
/// transport's short poll timeout, possibly nothing.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Open the link. Fails with [`TelemetryError::Connection`](crate::error::TelemetryError::Connection)
    /// when the device cannot be reached.
    fn connect(&mut self, options: &ConnectOptions) -> Result<()>;

    /// Close the link. Closing a closed link is a no-op.
    fn disconnect(&mut self);

    /// Whether the link is currently open
    fn is_connected(&self) -> bool;

    /// Read up to `max` pending bytes
    fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Write all of `data`, returning the number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Cumulative counters
    fn stats(&self) -> TransportStats;

    /// Zero the counters
    fn reset_stats(&mut self);
}

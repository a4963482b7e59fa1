//! In-memory loopback transport
//!
//! [`MemoryTransport::pair`] returns the transport and a [`MemoryPeer`] that
//! plays the device: it injects bytes the transport will read and collects
//! what the transport writes. Used by tests and demos that need a link
//! without hardware.

use super::transport::{Transport, TransportStats};
use crate::error::{Result, TelemetryError};
use crate::types::ConnectOptions;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Pause of a read finding nothing queued, so a polling loop does not spin
const EMPTY_READ_PAUSE: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    /// Link state as seen by the device side
    up: bool,
    refuse: Option<String>,
    connects: u32,
}

fn wire(inner: &Arc<Mutex<Wire>>) -> MutexGuard<'_, Wire> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport half of an in-memory link
#[derive(Debug)]
pub struct MemoryTransport {
    wire: Arc<Mutex<Wire>>,
    connected: bool,
    stats: TransportStats,
}

/// Device half of an in-memory link
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    wire: Arc<Mutex<Wire>>,
}

impl MemoryTransport {
    /// Create a linked transport/peer pair
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let wire = Arc::new(Mutex::new(Wire {
            up: true,
            ..Wire::default()
        }));
        (
            MemoryTransport {
                wire: wire.clone(),
                connected: false,
                stats: TransportStats::default(),
            },
            MemoryPeer { wire },
        )
    }
}

impl MemoryPeer {
    /// Queue bytes for the transport to read
    pub fn push(&self, bytes: &[u8]) {
        wire(&self.wire).inbound.extend(bytes.iter().copied());
    }

    /// Queue one `\n`-terminated line
    pub fn push_line(&self, line: &str) {
        let mut wire = wire(&self.wire);
        wire.inbound.extend(line.bytes());
        wire.inbound.push_back(b'\n');
    }

    /// Take everything the transport has written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut wire(&self.wire).outbound)
    }

    /// Make subsequent connects fail with `reason`, or succeed again with `None`
    pub fn refuse_connections(&self, reason: Option<&str>) {
        wire(&self.wire).refuse = reason.map(str::to_string);
    }

    /// Simulate the device going away: the next read fails and the
    /// transport reports itself disconnected.
    pub fn hang_up(&self) {
        wire(&self.wire).up = false;
    }

    /// Number of successful connects so far
    pub fn connects(&self) -> u32 {
        wire(&self.wire).connects
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let mut wire = wire(&self.wire);
        if let Some(reason) = wire.refuse.clone() {
            return Err(TelemetryError::connection(
                &options.port,
                ErrorKind::ConnectionRefused,
                reason,
            ));
        }
        wire.up = true;
        wire.connects += 1;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected && wire(&self.wire).up
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        let mut wire = wire(&self.wire);
        if !wire.up {
            self.connected = false;
            return Err(TelemetryError::Transport("peer hung up".to_string()));
        }
        let take = max.min(wire.inbound.len());
        let bytes: Vec<u8> = wire.inbound.drain(..take).collect();
        drop(wire);
        if bytes.is_empty() {
            std::thread::sleep(EMPTY_READ_PAUSE);
        }
        self.stats.record_rx(bytes.len());
        Ok(bytes)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        wire(&self.wire).outbound.extend_from_slice(data);
        self.stats.record_tx(data.len());
        Ok(data.len())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

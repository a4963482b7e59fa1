//! Port-string dispatch over the built-in transports

use super::sim::SimTransport;
use super::tcp::TcpTransport;
use super::transport::{Transport, TransportStats};
use crate::error::{Result, TelemetryError};
use crate::types::ConnectOptions;
use std::io::ErrorKind;

/// Transport chosen by the port string given at connect time
///
/// - `sim`, `sim:<profile>` : [`SimTransport`]
/// - `tcp://host:port` : [`TcpTransport`]
#[derive(Debug, Default)]
pub enum DeviceTransport {
    #[default]
    Idle,
    Sim(SimTransport),
    Tcp(TcpTransport),
}

impl DeviceTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short name of the active backend
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceTransport::Idle => "none",
            DeviceTransport::Sim(_) => "simulator",
            DeviceTransport::Tcp(_) => "tcp",
        }
    }

    fn inner(&self) -> Option<&dyn Transport> {
        match self {
            DeviceTransport::Idle => None,
            DeviceTransport::Sim(t) => Some(t as &dyn Transport),
            DeviceTransport::Tcp(t) => Some(t as &dyn Transport),
        }
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Transport> {
        match self {
            DeviceTransport::Idle => None,
            DeviceTransport::Sim(t) => Some(t as &mut dyn Transport),
            DeviceTransport::Tcp(t) => Some(t as &mut dyn Transport),
        }
    }
}

impl Transport for DeviceTransport {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let mut next = if SimTransport::handles(&options.port) {
            DeviceTransport::Sim(SimTransport::new())
        } else if TcpTransport::handles(&options.port) {
            DeviceTransport::Tcp(TcpTransport::new())
        } else {
            return Err(TelemetryError::connection(
                &options.port,
                ErrorKind::Unsupported,
                "unsupported port (expected 'sim', 'sim:<profile>' or 'tcp://host:port')",
            ));
        };

        if let Some(inner) = next.inner_mut() {
            inner.connect(options)?;
        }
        self.disconnect();
        *self = next;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(inner) = self.inner_mut() {
            inner.disconnect();
        }
    }

    fn is_connected(&self) -> bool {
        self.inner().is_some_and(|t| t.is_connected())
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        self.inner_mut()
            .ok_or(TelemetryError::NotConnected)?
            .read(max)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner_mut()
            .ok_or(TelemetryError::NotConnected)?
            .write(data)
    }

    fn stats(&self) -> TransportStats {
        self.inner().map(|t| t.stats()).unwrap_or_default()
    }

    fn reset_stats(&mut self) {
        if let Some(inner) = self.inner_mut() {
            inner.reset_stats();
        }
    }
}

//! TCP transport for serial-over-IP bridges
//!
//! Port strings look like `tcp://host:port`. Reads use a short socket
//! timeout so the runner tick never blocks for long.

use super::transport::{Transport, TransportStats};
use crate::error::{Result, TelemetryError};
use crate::types::ConnectOptions;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Scheme prefix selecting this transport
pub const SCHEME: &str = "tcp://";

/// Timeout for establishing the connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout, bounds how long a runner tick can wait for data
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Write timeout applied to published frames
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Byte-stream link over TCP
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    stats: TransportStats,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `port` names a TCP endpoint
    pub fn handles(port: &str) -> bool {
        port.starts_with(SCHEME)
    }

    fn open(port: &str) -> std::io::Result<TcpStream> {
        let endpoint = port.strip_prefix(SCHEME).unwrap_or(port);
        let socket_addr = endpoint.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "no TCP addresses resolved")
        })?;
        let stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn drop_stream(&mut self, reason: &str) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::warn!(reason, "TCP link closed");
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        self.disconnect();
        let stream = Self::open(&options.port).map_err(|source| TelemetryError::Connection {
            port: options.port.clone(),
            source,
        })?;
        tracing::info!(port = %options.port, "TCP link open");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::info!("TCP link closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(TelemetryError::NotConnected)?;
        let mut buf = vec![0u8; max];
        match stream.read(&mut buf) {
            Ok(0) if max > 0 => {
                self.drop_stream("closed by peer");
                Err(TelemetryError::Transport("connection closed by peer".to_string()))
            }
            Ok(n) => {
                buf.truncate(n);
                self.stats.record_rx(n);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Vec::new())
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => {
                self.drop_stream("read failed");
                Err(TelemetryError::Transport(format!("read failed: {}", e)))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TelemetryError::NotConnected)?;
        let written = stream.write_all(data).and_then(|_| stream.flush());
        match written {
            Ok(()) => {
                self.stats.record_tx(data.len());
                Ok(data.len())
            }
            Err(e) => {
                self.drop_stream("write failed");
                Err(TelemetryError::Transport(format!("write failed: {}", e)))
            }
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

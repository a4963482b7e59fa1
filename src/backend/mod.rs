//! Backend module: device link and background runner
//!
//! This module handles all device communication. Decoding runs on the
//! runner thread; the console thread only touches the link to publish and
//! to read counters.
//!
//! # Architecture
//!
//! - [`Transport`] - Byte stream to the device (simulator, TCP, in-memory)
//! - [`DecodeEngine`] - Framing layer turning bytes into [`Sample`](crate::types::Sample)s
//! - [`Link`] - One transport plus one decode engine, behind its own mutex
//! - [`Runner`] - Background loop ticking the link into the topic store
//! - [`LinkStatistics`] - Rolling link-speed figures
//!
//! # Example
//!
//! ```ignore
//! use telemetry_cli::backend::{DeviceTransport, LineCodec, Link, Runner};
//! use telemetry_cli::config::RunnerConfig;
//! use telemetry_cli::state::SessionState;
//! use telemetry_cli::types::ConnectOptions;
//!
//! let link = Link::new(DeviceTransport::new(), LineCodec::new()).shared();
//! let state = SessionState::default().shared();
//! let mut runner = Runner::new(link, state.clone(), &RunnerConfig::default());
//!
//! runner.connect(&ConnectOptions::new("sim", 115200))?;
//! // ... the store fills up in the background
//! runner.terminate();
//! ```

pub mod codec;
pub mod device;
pub mod line_codec;
pub mod memory;
pub mod runner;
pub mod sim;
pub mod stats;
pub mod tcp;
pub mod transport;

pub use codec::{Corruption, DecodeEngine, ProtocolStats};
pub use device::DeviceTransport;
pub use line_codec::LineCodec;
pub use memory::{MemoryPeer, MemoryTransport};
pub use runner::{LinkReport, Runner, BAUDSPEED, BAUDSPEED_AVG};
pub use sim::{SimTransport, Waveform};
pub use stats::{LinkStatistics, SpeedStats};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportStats};

use std::sync::{Arc, Mutex};

/// A transport and the decode engine reading from it
pub struct Link {
    pub transport: Box<dyn Transport>,
    pub codec: Box<dyn DecodeEngine>,
}

/// Link shared between the runner and the console
pub type SharedLink = Arc<Mutex<Link>>;

impl Link {
    pub fn new(
        transport: impl Transport + 'static,
        codec: impl DecodeEngine + 'static,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            codec: Box::new(codec),
        }
    }

    /// Wrap the link for sharing
    pub fn shared(self) -> SharedLink {
        Arc::new(Mutex::new(self))
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("connected", &self.transport.is_connected())
            .finish_non_exhaustive()
    }
}

//! # telemetry-cli: terminal client for streaming telemetry links
//!
//! Monitors and drives a remote device that streams named samples ("topics")
//! over a byte link. Decoded samples are buffered per topic, can be printed,
//! dumped or plotted live, and values can be published back to the device.
//!
//! ## Architecture
//!
//! - **Backend**: transports, the line codec and the background [`Runner`]
//! - **Store**: per-topic history plus live transfers to plot windows
//! - **Plot**: plot windows running as child processes, drawn with eframe/egui_plot
//! - **Console**: the interactive command layer, parsed with clap
//! - **Communication**: crossbeam channels between the store and the plots
//!
//! ## Configuration
//!
//! Settings are read from `<config_dir>/telemetry-cli/config.toml`. The last
//! used port is remembered in `<data_dir>/telemetry-cli/app_state.json`.
//!
//! ## Example
//!
//! ```ignore
//! use telemetry_cli::{
//!     backend::{DeviceTransport, LineCodec, Link, Runner},
//!     config::AppConfig,
//!     console::Console,
//!     plot::ProcessSpawner,
//!     state::SessionState,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load_or_default(None);
//!     let link = Link::new(DeviceTransport::new(), LineCodec::new()).shared();
//!     let state = SessionState::default().shared();
//!     let runner = Runner::new(link, state.clone(), &config.runner);
//!
//!     let spawner = ProcessSpawner::new(config.plot.clone())?;
//!     let mut console = Console::new(runner, state, spawner, std::io::stdout());
//!     console.run(std::io::stdin().lock())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod plot;
pub mod state;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{Link, Runner};
pub use config::{AppConfig, AppState};
pub use console::Console;
pub use error::{Result, TelemetryError};
pub use state::{SessionState, SharedState};
pub use store::TopicStore;
pub use types::{ConnectOptions, Payload, PayloadType, Sample, SampleMetadata};

//! Configuration module for telemetry-cli
//!
//! This module handles:
//! - User configuration (`config.toml`): connection defaults, runner timing,
//!   logging and plot window settings
//! - Application state persistence (`app_state.json`): last used port and
//!   baudrate, recently used ports
//!
//! # Locations
//!
//! Configuration lives in the platform config directory, state and logs in
//! the platform data directory:
//! - **Linux**: `~/.config/telemetry-cli/`, `~/.local/share/telemetry-cli/`
//! - **macOS**: `~/Library/Application Support/telemetry-cli/`
//! - **Windows**: `%APPDATA%\telemetry-cli\`
//!
//! # Example
//!
//! ```toml
//! [connection]
//! port = "tcp://192.168.1.20:5000"
//! baudrate = 115200
//!
//! [runner]
//! idle_interval_ms = 500
//!
//! [logging]
//! enabled = true
//! filter = "info,telemetry::rx=debug"
//!
//! [plot]
//! max_points = 5000
//! ```

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier used for directory names
pub const APP_ID: &str = "telemetry-cli";

/// Configuration file name
pub const CONFIG_FILE: &str = "config.toml";

/// App state file name
pub const APP_STATE_FILE: &str = "app_state.json";

/// Maximum number of recent ports to remember
pub const MAX_RECENT_PORTS: usize = 5;

/// Default port: the built-in simulator
pub const DEFAULT_PORT: &str = "sim";

/// Default link speed in bauds
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str =
    "info,telemetry_cli=debug,telemetry::rx=debug,telemetry::tx=debug,topics=debug";

// ==================== Directories ====================

/// Platform config directory of the application
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Platform data directory of the application
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default path of the configuration file
pub fn config_path() -> Option<PathBuf> {
    app_config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Default path of the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TelemetryError::Config(format!("Failed to create directory {:?}: {}", parent, e))
        })?;
    }
    Ok(())
}

// ==================== Configuration ====================

/// Connection defaults used when `serial` is given no arguments and no
/// previous connection is remembered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
        }
    }
}

/// Background runner timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Sleep between checks while disconnected
    pub idle_interval_ms: u64,
    /// Minimum spacing of link-speed samples
    pub stats_interval_ms: u64,
    /// Smoothing factor N of the average speed
    pub average_window: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 500,
            stats_interval_ms: 50,
            average_window: 20,
        }
    }
}

impl RunnerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Session log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a per-session log file
    pub enabled: bool,
    /// Directory holding one sub-directory per session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Configured log directory, or `<data_dir>/telemetry-cli/logs`
    pub fn resolved_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| app_data_dir().map(|p| p.join("logs")))
    }
}

/// Plot window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Points kept by a window before the oldest are dropped
    pub max_points: usize,
    /// Initial window width in points
    pub width: u32,
    /// Initial window height in points
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            max_points: 10_000,
            width: 1000,
            height: 600,
        }
    }
}

/// Complete user configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
    pub plot: PlotConfig,
}

impl AppConfig {
    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            TelemetryError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from `path`, or from the default location when `None`; fall back
    /// to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(config_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| TelemetryError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            TelemetryError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== App State ====================

/// State remembered between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migrations
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Port of the last successful connection
    #[serde(default)]
    pub last_port: Option<String>,

    /// Baudrate of the last successful connection
    #[serde(default)]
    pub last_baudrate: Option<u32>,

    /// Recently used ports, most recent first
    #[serde(default)]
    pub recent_ports: Vec<String>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: default_app_state_version(),
            last_port: None,
            last_baudrate: None,
            recent_ports: Vec::new(),
        }
    }
}

impl AppState {
    /// Load app state from a file. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| TelemetryError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = app_state_path() else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to a file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TelemetryError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TelemetryError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let path = app_state_path().ok_or_else(|| {
            TelemetryError::Config("Could not determine app state path".to_string())
        })?;
        self.save_to(path)
    }

    /// Remember a successful connection
    pub fn record_connection(&mut self, port: &str, baudrate: u32) {
        self.last_port = Some(port.to_string());
        self.last_baudrate = Some(baudrate);

        self.recent_ports.retain(|p| p != port);
        self.recent_ports.insert(0, port.to_string());
        self.recent_ports.truncate(MAX_RECENT_PORTS);
    }

    /// Port and baudrate to use when none are given: the last connection,
    /// else the configured defaults
    pub fn connection_or(&self, defaults: &ConnectionConfig) -> (String, u32) {
        (
            self.last_port
                .clone()
                .unwrap_or_else(|| defaults.port.clone()),
            self.last_baudrate.unwrap_or(defaults.baudrate),
        )
    }
}

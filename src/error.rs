//! Error handling for the telemetry client
//!
//! This module defines the crate-wide error type and a Result alias.
//! Lookups of unknown topics are not errors: the store answers them with
//! `None`, `0` or `false` and callers decide how to present them.

use thiserror::Error;

/// Main error type for telemetry client operations
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The transport refused to open
    #[error("Failed to connect to {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation needed an open link
    #[error("Not connected")]
    NotConnected,

    /// Mid-session transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Encoding or decoding failure in the codec
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A value does not fit the requested payload type
    #[error("Value '{value}' is not a valid {payload_type}")]
    InvalidPayload { value: String, payload_type: String },

    /// Unknown payload type name
    #[error("Unknown payload type '{0}' (expected one of string, uint8, uint16, uint32, int8, int16, int32, float32)")]
    UnknownPayloadType(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to plot windows
    #[error("Plot error: {0}")]
    Plot(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TelemetryError>,
    },
}

impl TelemetryError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TelemetryError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a connection error from an io error kind and message
    pub fn connection(
        port: impl Into<String>,
        kind: std::io::ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        TelemetryError::Connection {
            port: port.into(),
            source: std::io::Error::new(kind, message.into()),
        }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Serialization(err.to_string())
    }
}

/// Result type alias for telemetry client operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

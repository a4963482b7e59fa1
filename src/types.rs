//! Core data types for the telemetry client
//!
//! This module contains the fundamental data structures shared by the
//! store, the runner and the console.
//!
//! # Main Types
//!
//! - [`Payload`] - A decoded sample value (integer, float or string)
//! - [`PayloadType`] - Wire types accepted when publishing to the device
//! - [`SampleMetadata`] - Positional metadata carried alongside a payload
//! - [`Sample`] - A decoded sample as produced by a decode engine
//! - [`TopicSource`] / [`TopicKind`] - Per-topic origin and addressing
//! - [`ConnectionStatus`] - Lifecycle state of the runner

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A decoded sample value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Any integer wire type
    Int(i64),
    /// Any floating point wire type
    Float(f64),
    /// String payload
    Text(String),
}

impl Payload {
    /// Numeric view of the payload, used by plots
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Int(v) => Some(*v as f64),
            Payload::Float(v) => Some(*v),
            Payload::Text(_) => None,
        }
    }

    /// Type a raw token by its lexical form.
    ///
    /// Double-quoted tokens are always strings, so `"12"` stays text.
    pub fn parse_lexical(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(inner) = raw
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Payload::Text(unescape(inner));
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Payload::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Payload::Float(v);
        }
        Payload::Text(raw.to_string())
    }

    /// Render the payload so that [`Payload::parse_lexical`] reads it back unchanged
    pub fn to_lexical(&self) -> String {
        match self {
            Payload::Int(v) => v.to_string(),
            Payload::Float(v) if v.fract() == 0.0 && v.is_finite() => format!("{:.1}", v),
            Payload::Float(v) => v.to_string(),
            Payload::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Int(v) => write!(f, "{}", v),
            Payload::Float(v) => write!(f, "{}", v),
            Payload::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<i32> for Payload {
    fn from(v: i32) -> Self {
        Payload::Int(v as i64)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Float(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Text(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Text(v)
    }
}

/// Wire types accepted when publishing a value to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    String,
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
}

impl PayloadType {
    /// All supported payload types, in the order they are listed to users
    pub const ALL: [PayloadType; 8] = [
        PayloadType::String,
        PayloadType::Uint8,
        PayloadType::Uint16,
        PayloadType::Uint32,
        PayloadType::Int8,
        PayloadType::Int16,
        PayloadType::Int32,
        PayloadType::Float32,
    ];

    /// Name of the type as typed by users
    pub fn name(&self) -> &'static str {
        match self {
            PayloadType::String => "string",
            PayloadType::Uint8 => "uint8",
            PayloadType::Uint16 => "uint16",
            PayloadType::Uint32 => "uint32",
            PayloadType::Int8 => "int8",
            PayloadType::Int16 => "int16",
            PayloadType::Int32 => "int32",
            PayloadType::Float32 => "float32",
        }
    }

    /// Inclusive integer range for integer types
    fn int_range(&self) -> Option<(i64, i64)> {
        match self {
            PayloadType::Uint8 => Some((0, u8::MAX as i64)),
            PayloadType::Uint16 => Some((0, u16::MAX as i64)),
            PayloadType::Uint32 => Some((0, u32::MAX as i64)),
            PayloadType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            PayloadType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            PayloadType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            PayloadType::String | PayloadType::Float32 => None,
        }
    }

    /// Convert a payload into this type, checking ranges.
    ///
    /// Text payloads are parsed, so raw console input can be passed as
    /// `Payload::Text`.
    pub fn coerce(&self, payload: &Payload) -> Result<Payload> {
        let invalid = || TelemetryError::InvalidPayload {
            value: payload.to_string(),
            payload_type: self.name().to_string(),
        };

        if *self == PayloadType::String {
            return Ok(Payload::Text(payload.to_string()));
        }

        let numeric = match payload {
            Payload::Text(s) => Payload::parse_lexical(s),
            other => other.clone(),
        };

        if let Some((min, max)) = self.int_range() {
            let value = match numeric {
                Payload::Int(v) => v,
                Payload::Float(v) if v.fract() == 0.0 && v.is_finite() => v as i64,
                _ => return Err(invalid()),
            };
            if value < min || value > max {
                return Err(invalid());
            }
            return Ok(Payload::Int(value));
        }

        // float32
        let value = numeric.as_f64().ok_or_else(invalid)?;
        if value.is_finite() && value.abs() > f32::MAX as f64 {
            return Err(invalid());
        }
        Ok(Payload::Float(value as f32 as f64))
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PayloadType {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        PayloadType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TelemetryError::UnknownPayloadType(s.to_string()))
    }
}

/// Positional metadata carried alongside a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMetadata {
    /// Plain sample, addressed by arrival order
    #[default]
    None,
    /// Sample addressed by an explicit index
    Indexed(u32),
}

impl SampleMetadata {
    /// The index, if any
    pub fn index(&self) -> Option<u32> {
        match self {
            SampleMetadata::None => None,
            SampleMetadata::Indexed(i) => Some(*i),
        }
    }
}

/// A decoded sample, as emitted by a decode engine
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub topic: String,
    pub payload: Payload,
    pub metadata: SampleMetadata,
}

impl Sample {
    /// Create a plain sample
    pub fn new(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            metadata: SampleMetadata::None,
        }
    }

    /// Create an indexed sample
    pub fn indexed(topic: impl Into<String>, index: u32, payload: impl Into<Payload>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            metadata: SampleMetadata::Indexed(index),
        }
    }
}

/// Where a topic's data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSource {
    /// Data arriving from the device
    #[default]
    Remote,
    /// Metrics synthesised locally (e.g. link speed)
    Cli,
}

impl fmt::Display for TopicSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicSource::Remote => write!(f, "remote"),
            TopicSource::Cli => write!(f, "cli"),
        }
    }
}

/// How a topic's history is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopicKind {
    /// Addressed by arrival order
    #[default]
    Linear,
    /// Addressed by an explicit index supplied with each sample
    Indexed,
}

impl TopicKind {
    /// Kind implied by a sample's metadata
    pub fn of(metadata: &SampleMetadata) -> Self {
        match metadata {
            SampleMetadata::None => TopicKind::Linear,
            SampleMetadata::Indexed(_) => TopicKind::Indexed,
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKind::Linear => write!(f, "linear"),
            TopicKind::Indexed => write!(f, "indexed"),
        }
    }
}

/// Lifecycle state of the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to any device
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and decoding
    Connected,
    /// Background loop stopped for good
    Terminated,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Options handed to a transport when connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Port name, e.g. `sim`, `sim:quiet` or `tcp://127.0.0.1:5000`
    pub port: String,
    /// Link speed in bauds
    pub baudrate: u32,
}

impl ConnectOptions {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
        }
    }
}

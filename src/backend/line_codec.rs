//! Line-oriented text codec
//!
//! One frame per line, terminated by `\n` (a trailing `\r` is tolerated):
//!
//! ```text
//! temperature 21.5
//! status "ok"
//! spectrum[3] 0.25
//! ```
//!
//! The topic is everything up to the first whitespace. An optional
//! `[index]` suffix addresses an indexed sample. The value is typed by its
//! lexical form (see [`Payload::parse_lexical`]).

use super::codec::{Corruption, DecodeEngine, ProtocolStats};
use super::transport::Transport;
use crate::error::{Result, ResultExt, TelemetryError};
use crate::types::{Payload, PayloadType, Sample};

/// Longest accepted frame, terminator excluded
pub const MAX_LINE_LEN: usize = 1024;

/// Bytes requested from the transport per tick
const READ_CHUNK: usize = 4096;

/// Text codec speaking `topic value` lines
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes of the frame currently being received
    pending: Vec<u8>,
    /// Set after an oversized frame until its terminator is seen
    discarding: bool,
    stats: ProtocolStats,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_line(&mut self, on_sample: &mut dyn FnMut(Sample)) {
        let line = std::mem::take(&mut self.pending);
        if self.discarding {
            self.discarding = false;
            return;
        }
        match parse_frame(&line) {
            Ok(sample) => {
                self.stats.rx_frames += 1;
                on_sample(sample);
            }
            Err(kind) => {
                self.stats.record_corruption(kind);
                tracing::debug!(
                    target: "telemetry::rx",
                    corruption = %kind,
                    frame = %String::from_utf8_lossy(&line),
                    "discarded frame"
                );
            }
        }
    }
}

/// Decode one frame (terminator already removed)
pub fn parse_frame(line: &[u8]) -> std::result::Result<Sample, Corruption> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = std::str::from_utf8(line).map_err(|_| Corruption::InvalidUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Corruption::Empty);
    }

    let (address, value) = text
        .split_once(char::is_whitespace)
        .ok_or(Corruption::MissingValue)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(Corruption::MissingValue);
    }
    let payload = Payload::parse_lexical(value);

    match address.split_once('[') {
        Some((name, rest)) => {
            let index = rest
                .strip_suffix(']')
                .and_then(|digits| digits.parse::<u32>().ok())
                .ok_or(Corruption::BadIndex)?;
            if name.is_empty() || name.contains(']') {
                return Err(Corruption::BadIndex);
            }
            Ok(Sample::indexed(name, index, payload))
        }
        None if address.contains(']') => Err(Corruption::BadIndex),
        None => Ok(Sample::new(address, payload)),
    }
}

/// Render a frame for `topic`, without checking the value
pub fn encode_frame(topic: &str, value: &Payload, payload_type: PayloadType) -> String {
    let rendered = match (payload_type, value) {
        (PayloadType::Float32, Payload::Float(v)) => format!("{:?}", *v as f32),
        _ => value.to_lexical(),
    };
    format!("{} {}\n", topic, rendered)
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty()
        || topic.len() > MAX_LINE_LEN / 2
        || topic.chars().any(|c| c.is_whitespace() || c == '[' || c == ']')
    {
        return Err(TelemetryError::Protocol(format!(
            "'{}' is not a valid topic name",
            topic
        )));
    }
    Ok(())
}

impl DecodeEngine for LineCodec {
    fn update(
        &mut self,
        transport: &mut dyn Transport,
        on_sample: &mut dyn FnMut(Sample),
    ) -> Result<()> {
        let chunk = transport.read(READ_CHUNK)?;

        for byte in chunk {
            if byte == b'\n' {
                self.finish_line(on_sample);
            } else if !self.discarding {
                self.pending.push(byte);
                if self.pending.len() > MAX_LINE_LEN {
                    self.pending.clear();
                    self.discarding = true;
                    self.stats.record_corruption(Corruption::Overflow);
                }
            }
        }
        Ok(())
    }

    fn publish(
        &mut self,
        transport: &mut dyn Transport,
        topic: &str,
        value: &Payload,
        payload_type: PayloadType,
    ) -> Result<()> {
        let checked = validate_topic(topic).and_then(|_| payload_type.coerce(value));
        let payload = match checked {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.tx_rejected += 1;
                return Err(e);
            }
        };

        let frame = encode_frame(topic, &payload, payload_type);
        transport
            .write(frame.as_bytes())
            .with_context(|| format!("Failed to send '{}'", topic))?;
        self.stats.tx_frames += 1;
        Ok(())
    }

    fn stats(&self) -> ProtocolStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

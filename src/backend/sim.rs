//! Simulated device for running without hardware
//!
//! `SimTransport` synthesises text frames for a handful of waveform topics
//! and paces them to the configured baudrate, so link statistics behave
//! like a real serial line. Anything written to it is looped back as
//! received data, which makes `pub` visible in `ls`.
//!
//! # Profiles
//!
//! - `sim` : sine, counter, ramp, square and triangle waves at 50 Hz plus an
//!   indexed `spectrum` topic (16 bins) refreshed at 5 Hz
//! - `sim:quiet` : a single `heartbeat` topic at 1 Hz

use super::transport::{Transport, TransportStats};
use crate::error::{Result, TelemetryError};
use crate::types::ConnectOptions;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Longest a read waits when nothing is ready, like a serial read timeout
const POLL_TIMEOUT: Duration = Duration::from_millis(5);

/// Upper bound on generated-but-unread bytes
const MAX_BACKLOG: usize = 16 * 1024;

/// Bits on the wire per byte (8N1 framing)
const BITS_PER_BYTE: f64 = 10.0;

/// Data generation pattern for a simulated topic
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Integer counter wrapping from `max` back to `min`
    Counter { step: i64, min: i64, max: i64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
    /// Triangle wave
    Triangle { period: f64, amplitude: f64 },
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sine {
            frequency: 1.0,
            amplitude: 100.0,
            offset: 0.0,
        }
    }
}

/// One simulated topic
#[derive(Debug, Clone)]
struct SimTopic {
    name: &'static str,
    waveform: Waveform,
    counter: i64,
}

impl SimTopic {
    fn new(name: &'static str, waveform: Waveform) -> Self {
        let counter = match waveform {
            Waveform::Counter { min, .. } => min,
            _ => 0,
        };
        Self {
            name,
            waveform,
            counter,
        }
    }

    /// Render the next value at `t` seconds
    fn render(&mut self, t: f64) -> String {
        match self.waveform {
            Waveform::Constant(v) => format!("{:.3}", v),
            Waveform::Sine {
                frequency,
                amplitude,
                offset,
            } => format!(
                "{:.3}",
                offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()
            ),
            Waveform::Counter { step, min, max } => {
                let value = self.counter;
                self.counter += step;
                if self.counter > max {
                    self.counter = min;
                } else if self.counter < min {
                    self.counter = max;
                }
                value.to_string()
            }
            Waveform::Sawtooth { period, amplitude } => {
                format!("{:.3}", amplitude * ((t % period) / period))
            }
            Waveform::Square { period, amplitude } => {
                let v = if t % period < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                };
                format!("{:.3}", v)
            }
            Waveform::Triangle { period, amplitude } => {
                let phase = t % period;
                let half = period / 2.0;
                let v = if phase < half {
                    amplitude * (2.0 * phase / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (phase - half) / half)
                };
                format!("{:.3}", v)
            }
        }
    }
}

/// Indexed topic emitted as a burst of `name[i] value` frames
#[derive(Debug, Clone)]
struct SimSpectrum {
    name: &'static str,
    bins: u32,
}

impl SimSpectrum {
    fn render(&self, t: f64, out: &mut VecDeque<u8>) {
        let peak = (self.bins as f64 / 2.0) * (1.0 + (0.5 * t).sin());
        for bin in 0..self.bins {
            let distance = bin as f64 - peak;
            let value = (-distance * distance / 4.0).exp() + 0.05 * rand_simple();
            push_line(out, &format!("{}[{}] {:.4}", self.name, bin, value));
        }
    }
}

/// Frame schedule of a profile
#[derive(Debug, Clone)]
struct Profile {
    topics: Vec<SimTopic>,
    topic_period: Duration,
    spectrum: Option<SimSpectrum>,
    spectrum_period: Duration,
}

impl Profile {
    fn by_name(name: &str) -> Option<Self> {
        match name {
            "" | "default" => Some(Self {
                topics: vec![
                    SimTopic::new(
                        "sine",
                        Waveform::Sine {
                            frequency: 0.5,
                            amplitude: 100.0,
                            offset: 0.0,
                        },
                    ),
                    SimTopic::new(
                        "counter",
                        Waveform::Counter {
                            step: 1,
                            min: 0,
                            max: 999,
                        },
                    ),
                    SimTopic::new(
                        "ramp",
                        Waveform::Sawtooth {
                            period: 4.0,
                            amplitude: 50.0,
                        },
                    ),
                    SimTopic::new(
                        "square",
                        Waveform::Square {
                            period: 2.0,
                            amplitude: 10.0,
                        },
                    ),
                    SimTopic::new(
                        "triangle",
                        Waveform::Triangle {
                            period: 3.0,
                            amplitude: 25.0,
                        },
                    ),
                ],
                topic_period: Duration::from_millis(20),
                spectrum: Some(SimSpectrum {
                    name: "spectrum",
                    bins: 16,
                }),
                spectrum_period: Duration::from_millis(200),
            }),
            "quiet" => Some(Self {
                topics: vec![SimTopic::new("heartbeat", Waveform::Constant(1.0))],
                topic_period: Duration::from_secs(1),
                spectrum: None,
                spectrum_period: Duration::from_secs(1),
            }),
            _ => None,
        }
    }
}

/// Simulated device link
#[derive(Debug)]
pub struct SimTransport {
    profile: Option<Profile>,
    started: Instant,
    /// Generated bytes waiting to be read
    backlog: VecDeque<u8>,
    next_topics: Duration,
    next_spectrum: Duration,
    /// Bytes per second the line can carry
    line_rate: f64,
    /// Bytes already delivered since connect
    delivered: u64,
    stats: TransportStats,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            profile: None,
            started: Instant::now(),
            backlog: VecDeque::new(),
            next_topics: Duration::ZERO,
            next_spectrum: Duration::ZERO,
            line_rate: 0.0,
            delivered: 0,
            stats: TransportStats::default(),
        }
    }

    /// Whether `port` names the simulator
    pub fn handles(port: &str) -> bool {
        port == "sim" || port.starts_with("sim:")
    }

    /// Names of the available profiles
    pub fn profiles() -> &'static [&'static str] {
        &["sim", "sim:quiet"]
    }

    /// Generate every frame due up to `elapsed`
    fn generate(&mut self, elapsed: Duration) {
        let Some(profile) = self.profile.as_mut() else {
            return;
        };

        while self.next_topics <= elapsed && self.backlog.len() < MAX_BACKLOG {
            let t = self.next_topics.as_secs_f64();
            for topic in profile.topics.iter_mut() {
                let value = topic.render(t);
                push_line(&mut self.backlog, &format!("{} {}", topic.name, value));
            }
            self.next_topics += profile.topic_period;
        }
        // Do not build up a backlog of stale periods
        if self.next_topics <= elapsed {
            self.next_topics = elapsed + profile.topic_period;
        }

        if let Some(spectrum) = &profile.spectrum {
            if self.next_spectrum <= elapsed {
                spectrum.render(self.next_spectrum.as_secs_f64(), &mut self.backlog);
                self.next_spectrum = elapsed + profile.spectrum_period;
            }
        }
    }

    /// Bytes the line could have carried by `elapsed` and not yet delivered
    fn budget(&self, elapsed: Duration) -> usize {
        let capacity = (elapsed.as_secs_f64() * self.line_rate) as u64;
        capacity.saturating_sub(self.delivered) as usize
    }
}

fn push_line(out: &mut VecDeque<u8>, line: &str) {
    out.extend(line.bytes());
    out.push_back(b'\n');
}

/// Simple pseudo-random number generator (for noise)
fn rand_simple() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static SEED: Cell<u64> = const { Cell::new(0x2545_f491_4f6c_dd1d) };
    }
    SEED.with(|seed| {
        let mut s = seed.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        seed.set(s);
        (s as f64) / (u64::MAX as f64)
    })
}

impl Transport for SimTransport {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let name = options
            .port
            .strip_prefix("sim")
            .map(|rest| rest.trim_start_matches(':'))
            .ok_or_else(|| {
                TelemetryError::connection(&options.port, ErrorKind::InvalidInput, "not a simulator port")
            })?;
        let profile = Profile::by_name(name).ok_or_else(|| {
            TelemetryError::connection(
                &options.port,
                ErrorKind::NotFound,
                format!("unknown simulator profile '{}'", name),
            )
        })?;
        if options.baudrate == 0 {
            return Err(TelemetryError::connection(
                &options.port,
                ErrorKind::InvalidInput,
                "baudrate must be positive",
            ));
        }

        self.profile = Some(profile);
        self.started = Instant::now();
        self.backlog.clear();
        self.next_topics = Duration::ZERO;
        self.next_spectrum = Duration::ZERO;
        self.line_rate = options.baudrate as f64 / BITS_PER_BYTE;
        self.delivered = 0;
        tracing::info!(port = %options.port, baudrate = options.baudrate, "simulator started");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.profile.take().is_some() {
            self.backlog.clear();
            tracing::info!("simulator stopped");
        }
    }

    fn is_connected(&self) -> bool {
        self.profile.is_some()
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        if self.profile.is_none() {
            return Err(TelemetryError::NotConnected);
        }

        let mut elapsed = self.started.elapsed();
        self.generate(elapsed);
        if self.backlog.is_empty() || self.budget(elapsed) == 0 {
            std::thread::sleep(POLL_TIMEOUT);
            elapsed = self.started.elapsed();
            self.generate(elapsed);
        }

        let take = max.min(self.budget(elapsed)).min(self.backlog.len());
        let bytes: Vec<u8> = self.backlog.drain(..take).collect();
        self.delivered += bytes.len() as u64;
        self.stats.record_rx(bytes.len());
        Ok(bytes)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.profile.is_none() {
            return Err(TelemetryError::NotConnected);
        }
        self.backlog.extend(data.iter().copied());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::line_codec::parse_frame;

    fn drain_for(transport: &mut SimTransport, duration: Duration) -> Vec<u8> {
        let deadline = Instant::now() + duration;
        let mut out = Vec::new();
        while Instant::now() < deadline {
            out.extend(transport.read(4096).unwrap());
        }
        out
    }

    #[test]
    fn test_waveforms() {
        let mut counter = SimTopic::new(
            "c",
            Waveform::Counter {
                step: 1,
                min: 0,
                max: 2,
            },
        );
        let values: Vec<String> = (0..4).map(|_| counter.render(0.0)).collect();
        assert_eq!(values, vec!["0", "1", "2", "0"]);

        let mut square = SimTopic::new(
            "s",
            Waveform::Square {
                period: 2.0,
                amplitude: 1.0,
            },
        );
        assert_eq!(square.render(0.5), "1.000");
        assert_eq!(square.render(1.5), "-1.000");

        let mut constant = SimTopic::new("k", Waveform::Constant(2.0));
        assert_eq!(constant.render(10.0), "2.000");
    }

    #[test]
    fn test_port_matching() {
        assert!(SimTransport::handles("sim"));
        assert!(SimTransport::handles("sim:quiet"));
        assert!(!SimTransport::handles("simulator"));
        assert!(!SimTransport::handles("tcp://localhost:1"));
    }

    #[test]
    fn test_unknown_profile_is_refused() {
        let mut sim = SimTransport::new();
        let err = sim
            .connect(&ConnectOptions::new("sim:loud", 9600))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Connection { .. }));
        assert!(!sim.is_connected());
    }

    #[test]
    fn test_generates_parsable_frames() {
        let mut sim = SimTransport::new();
        sim.connect(&ConnectOptions::new("sim", 115200)).unwrap();

        let bytes = drain_for(&mut sim, Duration::from_millis(100));
        assert!(!bytes.is_empty());

        let mut lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        // The read budget may have cut the last frame short
        lines.pop();
        let frames: Vec<_> = lines
            .into_iter()
            .map(|line| parse_frame(line).expect("simulator frame"))
            .collect();
        assert!(frames.iter().any(|s| s.topic == "sine"));
        assert!(frames
            .iter()
            .any(|s| s.topic == "spectrum" && s.metadata.index().is_some()));
        assert_eq!(sim.stats().rx_bytes, bytes.len() as u64);
    }

    #[test]
    fn test_output_is_paced_by_baudrate() {
        let mut sim = SimTransport::new();
        sim.connect(&ConnectOptions::new("sim", 1200)).unwrap();

        let bytes = drain_for(&mut sim, Duration::from_millis(200));
        // 1200 bauds carry 120 bytes per second
        assert!(bytes.len() <= 30, "got {} bytes", bytes.len());
    }

    #[test]
    fn test_writes_are_looped_back() {
        let mut sim = SimTransport::new();
        sim.connect(&ConnectOptions::new("sim:quiet", 115200)).unwrap();
        sim.write(b"led 1\n").unwrap();

        let bytes = drain_for(&mut sim, Duration::from_millis(50));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("led 1\n"));
        assert_eq!(sim.stats().tx_bytes, 6);
    }

    #[test]
    fn test_disconnect() {
        let mut sim = SimTransport::new();
        sim.connect(&ConnectOptions::new("sim", 9600)).unwrap();
        sim.disconnect();
        sim.disconnect();
        assert!(!sim.is_connected());
        assert!(matches!(sim.read(1), Err(TelemetryError::NotConnected)));
    }
}

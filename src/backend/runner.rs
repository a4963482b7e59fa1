//! Background runner driving the decode loop
//!
//! The runner owns the single background thread of a session. While
//! connected it ticks continuously; while disconnected it parks for the idle
//! interval. Each tick:
//!
//! 1. drains decoded samples from the link (link lock only)
//! 2. applies them to the topic store, samples link speed at a bounded rate
//!    and reaps the first plot that reported `closing` (state lock only)
//!
//! The link and state locks are never held together. A tick runs under the
//! session lock, which [`Runner::connect`] also takes, so samples drained
//! from the previous link can never land in the store of the next session.
//!
//! # Lifecycle
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`, and
//! `Terminated` for good after [`Runner::terminate`].

use super::codec::ProtocolStats;
use super::stats::SpeedStats;
use super::transport::TransportStats;
use super::{Link, SharedLink};
use crate::config::RunnerConfig;
use crate::error::{Result, TelemetryError};
use crate::state::{lock, SessionState, SharedState};
use crate::types::{ConnectOptions, ConnectionStatus, Payload, PayloadType, SampleMetadata, TopicSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cli topic carrying the instant link speed
pub const BAUDSPEED: &str = "baudspeed";
/// Cli topic carrying the smoothed link speed
pub const BAUDSPEED_AVG: &str = "baudspeed_avg";

/// Pause after a failed tick, so a persistent error does not spin
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Counters of the transport and the codec, read together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub transport: TransportStats,
    pub protocol: ProtocolStats,
}

/// State shared between the runner handle and its thread
struct RunnerShared {
    link: SharedLink,
    state: SharedState,
    idle_interval: Duration,
    running: AtomicBool,
    connecting: AtomicBool,
    connected: AtomicBool,
    terminated: AtomicBool,
    ticks: AtomicU64,
    last_error: Mutex<Option<String>>,
    /// Serializes a whole tick against a connect
    session: Mutex<()>,
}

impl RunnerShared {
    fn tick(&self) -> Result<usize> {
        let _session = lock(&self.session);
        let mut samples = Vec::new();
        let (outcome, rx_bytes, alive) = {
            let mut link = lock(&self.link);
            let Link { transport, codec } = &mut *link;
            let outcome = codec.update(&mut **transport, &mut |sample| samples.push(sample));
            (outcome, transport.stats().rx_bytes, transport.is_connected())
        };
        let applied = samples.len();

        {
            let mut state = lock(&self.state);
            let SessionState { topics, stats, .. } = &mut *state;
            for sample in samples {
                tracing::debug!(
                    target: "telemetry::rx",
                    topic = %sample.topic,
                    index = ?sample.metadata.index(),
                    value = %sample.payload,
                    "sample"
                );
                topics.process(&sample.topic, sample.payload, sample.metadata);
            }

            if let Some((speed, average)) = stats.sample(Instant::now(), rx_bytes) {
                topics.process(BAUDSPEED, Payload::Float(speed), SampleMetadata::None);
                topics.process(BAUDSPEED_AVG, Payload::Float(average), SampleMetadata::None);
            }

            state.reap_closed_plot();
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        if !alive && self.connected.swap(false, Ordering::SeqCst) {
            tracing::warn!("Link lost, runner idle until the next connect");
        }
        outcome.map(|_| applied)
    }

    fn record_error(&self, error: &TelemetryError) {
        *lock(&self.last_error) = Some(error.to_string());
    }

    fn run(&self) {
        tracing::info!("Runner started");

        while self.running.load(Ordering::SeqCst) {
            if self.connected.load(Ordering::SeqCst) {
                if let Err(e) = self.tick() {
                    tracing::error!("Runner tick failed: {}", e);
                    self.record_error(&e);
                    std::thread::sleep(ERROR_BACKOFF);
                }
            } else {
                std::thread::park_timeout(self.idle_interval);
            }
        }

        tracing::info!("Runner stopped");
    }
}

/// Handle on the background runner
pub struct Runner {
    shared: Arc<RunnerShared>,
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    /// Create an idle runner. No thread is started until the first
    /// successful [`connect`](Runner::connect).
    pub fn new(link: SharedLink, state: SharedState, config: &RunnerConfig) -> Self {
        Self {
            shared: Arc::new(RunnerShared {
                link,
                state,
                idle_interval: config.idle_interval(),
                running: AtomicBool::new(true),
                connecting: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                last_error: Mutex::new(None),
                session: Mutex::new(()),
            }),
            handle: None,
        }
    }

    /// Open the link and start a clean session.
    ///
    /// On success the codec framing and the topic store are cleared, the cli
    /// speed topics are created, statistics are reset, active plots are
    /// cleared and registered again, and the background loop is started if
    /// it is not running yet. On failure the store is left untouched and the
    /// runner stays disconnected.
    ///
    /// Waits for an in-flight tick to finish first.
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(TelemetryError::Transport("runner has been terminated".to_string()));
        }

        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.connecting.store(true, Ordering::SeqCst);
        tracing::info!(port = %options.port, baudrate = options.baudrate, "Connecting");

        let session = lock(&self.shared.session);
        let opened = {
            let mut link = lock(&self.shared.link);
            match link.transport.connect(options) {
                Ok(()) => {
                    link.transport.reset_stats();
                    link.codec.reset_stats();
                    link.codec.reset();
                    Ok(())
                }
                Err(e) => {
                    link.transport.disconnect();
                    Err(e)
                }
            }
        };
        self.shared.connecting.store(false, Ordering::SeqCst);

        if let Err(e) = opened {
            tracing::error!("Failed to connect: {}", e);
            return Err(e);
        }

        {
            let mut state = lock(&self.shared.state);
            state.topics.clear();
            state.topics.create(BAUDSPEED, TopicSource::Cli);
            state.topics.create(BAUDSPEED_AVG, TopicSource::Cli);
            state.stats.reset(options.baudrate, Instant::now());
            state.restart_plots();
        }
        *lock(&self.shared.last_error) = None;

        self.shared.connected.store(true, Ordering::SeqCst);
        drop(session);
        self.ensure_thread()?;
        tracing::info!(port = %options.port, "Connected");
        Ok(())
    }

    fn ensure_thread(&mut self) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.thread().unpark(),
            None => {
                let shared = self.shared.clone();
                let handle = std::thread::Builder::new()
                    .name("runner".to_string())
                    .spawn(move || shared.run())?;
                self.handle = Some(handle);
            }
        }
        Ok(())
    }

    /// Stop decoding and close the link. Safe to call when disconnected.
    pub fn disconnect(&self) {
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);
        lock(&self.shared.link).transport.disconnect();
        if was_connected {
            tracing::info!("Disconnected");
        }
    }

    /// Stop the background loop, wait for it and close the link
    pub fn terminate(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::error!("Runner thread panicked");
            }
        }
        self.disconnect();
        self.shared.terminated.store(true, Ordering::SeqCst);
    }

    /// Run one tick on the calling thread.
    ///
    /// Returns the number of decoded samples applied to the store. Decode
    /// and transport errors are returned as they are.
    pub fn update(&self) -> Result<usize> {
        self.shared.tick()
    }

    /// Encode and send `value` on `topic`
    pub fn publish(&self, topic: &str, value: &Payload, payload_type: PayloadType) -> Result<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TelemetryError::NotConnected);
        }
        let mut link = lock(&self.shared.link);
        let Link { transport, codec } = &mut *link;
        codec.publish(&mut **transport, topic, value, payload_type)?;
        tracing::info!(
            target: "telemetry::tx",
            topic,
            value = %value,
            payload_type = %payload_type,
            "published"
        );
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.shared.terminated.load(Ordering::SeqCst) {
            ConnectionStatus::Terminated
        } else if self.shared.connecting.load(Ordering::SeqCst) {
            ConnectionStatus::Connecting
        } else if self.shared.connected.load(Ordering::SeqCst) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether the background thread has been started and not joined
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Speed figures of the current session
    pub fn stats(&self) -> SpeedStats {
        lock(&self.shared.state).stats.snapshot()
    }

    /// Transport and codec counters
    pub fn link_stats(&self) -> LinkReport {
        let link = lock(&self.shared.link);
        LinkReport {
            transport: link.transport.stats(),
            protocol: link.codec.stats(),
        }
    }

    /// Ticks run since creation
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Message of the last failed background tick of this session
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.terminate();
        }
    }
}

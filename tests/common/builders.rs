//! Test data builders for creating sessions

use telemetry_cli::backend::stats::LinkStatistics;
use telemetry_cli::backend::{LineCodec, Link, MemoryPeer, MemoryTransport, Runner};
use telemetry_cli::config::RunnerConfig;
use telemetry_cli::state::{SessionState, SharedState};
use std::time::Duration;

/// A runner on an in-memory link, with the device end exposed
pub struct TestSession {
    pub runner: Runner,
    pub state: SharedState,
    pub peer: MemoryPeer,
}

/// Builder for [`TestSession`]
pub struct SessionBuilder {
    config: RunnerConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig {
                idle_interval_ms: 10,
                stats_interval_ms: 20,
                average_window: 20,
            },
        }
    }

    pub fn idle_interval_ms(mut self, ms: u64) -> Self {
        self.config.idle_interval_ms = ms;
        self
    }

    pub fn stats_interval_ms(mut self, ms: u64) -> Self {
        self.config.stats_interval_ms = ms;
        self
    }

    pub fn build(self) -> TestSession {
        let (transport, peer) = MemoryTransport::pair();
        let link = Link::new(transport, LineCodec::new()).shared();
        let stats = LinkStatistics::new(
            Duration::from_millis(self.config.stats_interval_ms),
            self.config.average_window,
        );
        let state = SessionState::new(stats).shared();
        let runner = Runner::new(link, state.clone(), &self.config);
        TestSession {
            runner,
            state,
            peer,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

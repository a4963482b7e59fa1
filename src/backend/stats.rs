//! Rolling link-speed statistics
//!
//! Speed is sampled at most once per `interval` from the transport's
//! cumulative received-byte counter. The average is an exponential moving
//! average: `average' = (instant + N * average) / (N + 1)`.

use std::time::{Duration, Instant};

/// Default minimum spacing between two speed samples
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Default smoothing factor `N`
pub const DEFAULT_WINDOW: u32 = 20;

/// Speed figures reported to callers
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedStats {
    /// Bytes per second over the last sampling interval
    pub speed: f64,
    /// Smoothed bytes per second
    pub average_speed: f64,
    /// `speed / baudrate`
    pub ratio: f64,
    /// `average_speed / baudrate`
    pub average_ratio: f64,
}

/// Rolling speed accumulator
#[derive(Debug, Clone)]
pub struct LinkStatistics {
    baudrate: u32,
    interval: Duration,
    window: f64,
    last_time: Instant,
    last_amount: u64,
    speed: f64,
    average_speed: f64,
}

impl Default for LinkStatistics {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_WINDOW)
    }
}

impl LinkStatistics {
    pub fn new(interval: Duration, window: u32) -> Self {
        Self {
            baudrate: 0,
            interval,
            window: window as f64,
            last_time: Instant::now(),
            last_amount: 0,
            speed: 0.0,
            average_speed: 0.0,
        }
    }

    /// Start over for a new connection at `baudrate`
    pub fn reset(&mut self, baudrate: u32, now: Instant) {
        self.baudrate = baudrate;
        self.last_time = now;
        self.last_amount = 0;
        self.speed = 0.0;
        self.average_speed = 0.0;
    }

    /// Feed the cumulative received-byte count observed at `now`.
    ///
    /// Returns the new `(speed, average_speed)` pair when a sample was taken,
    /// `None` when the interval has not elapsed yet.
    pub fn sample(&mut self, now: Instant, rx_bytes: u64) -> Option<(f64, f64)> {
        let elapsed = now.saturating_duration_since(self.last_time);
        if elapsed <= self.interval {
            return None;
        }

        let delta = rx_bytes.saturating_sub(self.last_amount);
        self.last_time = now;
        self.last_amount = rx_bytes;

        self.speed = delta as f64 / elapsed.as_secs_f64();
        self.average_speed = (self.speed + self.window * self.average_speed) / (self.window + 1.0);
        Some((self.speed, self.average_speed))
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Current figures; ratios read as zero until a baudrate is known
    pub fn snapshot(&self) -> SpeedStats {
        let ratio = |v: f64| {
            if self.baudrate == 0 {
                0.0
            } else {
                v / self.baudrate as f64
            }
        };
        SpeedStats {
            speed: self.speed,
            average_speed: self.average_speed,
            ratio: ratio(self.speed),
            average_ratio: ratio(self.average_speed),
        }
    }
}

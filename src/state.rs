//! Shared session state
//!
//! Everything the runner thread and the console thread both mutate lives in
//! one [`SessionState`] behind one mutex. Holding the lock for a whole
//! runner tick keeps per-topic order identical to decode order.

use crate::backend::stats::LinkStatistics;
use crate::plot::{ControlMessage, PlotHandle};
use crate::store::TopicStore;
use std::sync::{Arc, Mutex, MutexGuard};

/// Topic store, active plots and link statistics
#[derive(Debug, Default)]
pub struct SessionState {
    pub topics: TopicStore,
    pub plots: Vec<PlotHandle>,
    pub stats: LinkStatistics,
}

/// Session state shared between threads
pub type SharedState = Arc<Mutex<SessionState>>;

impl SessionState {
    pub fn new(stats: LinkStatistics) -> Self {
        Self {
            topics: TopicStore::new(),
            plots: Vec::new(),
            stats,
        }
    }

    /// Wrap the state for sharing
    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Find the first plot whose renderer reported `closing`, close its
    /// control channel, stop its transfer and forget it.
    ///
    /// At most one plot is removed per call. Returns its topic.
    pub fn reap_closed_plot(&mut self) -> Option<String> {
        let position = self.plots.iter().position(|plot| plot.poll_closing())?;
        let mut plot = self.plots.remove(position);
        plot.control.close();
        self.topics.untransfer(&plot.topic);
        tracing::info!(target: "topics", topic = %plot.topic, "plot closed");
        Some(plot.topic)
    }

    /// Point every active plot at the current store: each renderer gets
    /// `clear`, then its transfer is registered again in its own mode.
    ///
    /// Used after the store was cleared for a new connection. Plots whose
    /// renderer is gone are left for reaping.
    pub fn restart_plots(&mut self) {
        let SessionState { topics, plots, .. } = self;
        for plot in plots.iter() {
            if plot.control.send(ControlMessage::Clear).is_err() {
                continue;
            }
            topics.transfer(&plot.topic, plot.queue.clone(), plot.mode);
        }
    }

    /// Index of the active plot showing `topic`
    pub fn plot_for(&self, topic: &str) -> Option<usize> {
        self.plots.iter().position(|plot| plot.topic == topic)
    }
}

/// Lock shared state, recovering the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

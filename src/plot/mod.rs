//! Plot consumers
//!
//! A plot is an external renderer fed by a transfer queue. The core only
//! sees three things per plot, bundled in a [`PlotHandle`]:
//!
//! - the topic it displays
//! - the [`TransferQueue`] registered with the topic store
//! - a duplex [`ControlChannel`] carrying `clear`, `exit` and `closing`
//!
//! [`PlotSpawner`] creates the renderer. The production spawner
//! ([`process::ProcessSpawner`]) runs each plot as a separate process;
//! tests plug in-process fakes.

pub mod process;
pub mod window;

use crate::error::{Result, TelemetryError};
use crate::store::{TransferMode, TransferPoint, TransferQueue};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use process::ProcessSpawner;

/// Lifecycle messages exchanged with a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMessage {
    /// Renderer resets its local buffers
    Clear,
    /// Renderer is asked to close
    Exit,
    /// Renderer acknowledges it has closed
    Closing,
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Clear => write!(f, "clear"),
            ControlMessage::Exit => write!(f, "exit"),
            ControlMessage::Closing => write!(f, "closing"),
        }
    }
}

/// One end of a duplex control channel
#[derive(Debug)]
pub struct ControlChannel {
    tx: Option<Sender<ControlMessage>>,
    rx: Receiver<ControlMessage>,
}

impl ControlChannel {
    /// Create both ends of a channel
    pub fn pair() -> (ControlChannel, ControlChannel) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            ControlChannel {
                tx: Some(a_tx),
                rx: a_rx,
            },
            ControlChannel {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }

    /// Send a message to the other end
    pub fn send(&self, message: ControlMessage) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TelemetryError::Plot("control channel is closed".to_string()))?;
        tx.send(message)
            .map_err(|_| TelemetryError::Plot("plot is gone".to_string()))
    }

    /// Next pending message, without blocking
    pub fn poll(&self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }

    /// Stop sending. The other end sees the channel disconnect.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Receiving side, for consumers that block or select on it
    pub fn receiver(&self) -> &Receiver<ControlMessage> {
        &self.rx
    }

    /// Split into the raw sender (if still open) and receiver
    pub fn into_parts(self) -> (Option<Sender<ControlMessage>>, Receiver<ControlMessage>) {
        (self.tx, self.rx)
    }
}

/// An active plot, as tracked by the session
#[derive(Debug)]
pub struct PlotHandle {
    pub topic: String,
    /// Mode the topic's transfer is registered in
    pub mode: TransferMode,
    /// Same queue as the topic's transfer registration
    pub queue: TransferQueue,
    pub control: ControlChannel,
}

impl PlotHandle {
    pub fn new(
        topic: impl Into<String>,
        mode: TransferMode,
        queue: TransferQueue,
        control: ControlChannel,
    ) -> Self {
        Self {
            topic: topic.into(),
            mode,
            queue,
            control,
        }
    }

    /// Whether the renderer reported `closing`.
    ///
    /// Consumes at most one pending control message.
    pub fn poll_closing(&self) -> bool {
        self.control.poll() == Some(ControlMessage::Closing)
    }
}

/// Renderer-side ends of a freshly spawned plot
#[derive(Debug)]
pub struct PlotLink {
    pub queue: TransferQueue,
    pub control: ControlChannel,
}

/// Creates renderers for topics
pub trait PlotSpawner: Send {
    /// Start a renderer for `topic` drawing points in `mode`
    fn spawn(&mut self, topic: &str, mode: TransferMode) -> Result<PlotLink>;
}

/// Messages sent to a plot window over its stdin, one JSON document per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMessage {
    Point(TransferPoint),
    Clear,
    Exit,
}

/// In-process renderer used by tests and headless sessions: points and
/// control messages are kept for inspection.
#[derive(Debug, Default)]
pub struct ChannelSpawner {
    spawned: Vec<SpawnedPlot>,
}

/// Renderer ends handed out by [`ChannelSpawner`]
#[derive(Debug)]
pub struct SpawnedPlot {
    pub topic: String,
    pub mode: TransferMode,
    pub points: Receiver<TransferPoint>,
    pub control: ControlChannel,
}

impl ChannelSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the renderer ends spawned so far
    pub fn take_spawned(&mut self) -> Vec<SpawnedPlot> {
        std::mem::take(&mut self.spawned)
    }
}

impl PlotSpawner for ChannelSpawner {
    fn spawn(&mut self, topic: &str, mode: TransferMode) -> Result<PlotLink> {
        let (queue, points) = unbounded();
        let (core_end, renderer_end) = ControlChannel::pair();
        self.spawned.push(SpawnedPlot {
            topic: topic.to_string(),
            mode,
            points,
            control: renderer_end,
        });
        Ok(PlotLink {
            queue,
            control: core_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use crossbeam_channel::TryRecvError;

    #[test]
    fn test_control_channel_is_duplex() {
        let (core, renderer) = ControlChannel::pair();
        core.send(ControlMessage::Clear).unwrap();
        renderer.send(ControlMessage::Closing).unwrap();

        assert_eq!(renderer.poll(), Some(ControlMessage::Clear));
        assert_eq!(renderer.poll(), None);
        assert_eq!(core.poll(), Some(ControlMessage::Closing));
    }

    #[test]
    fn test_close_is_seen_by_peer() {
        let (mut core, renderer) = ControlChannel::pair();
        assert_eq!(renderer.receiver().try_recv(), Err(TryRecvError::Empty));

        core.close();
        core.close();
        assert!(core.is_closed());
        assert!(core.send(ControlMessage::Exit).is_err());
        assert_eq!(
            renderer.receiver().try_recv(),
            Err(TryRecvError::Disconnected)
        );
    }

    #[test]
    fn test_send_to_dropped_peer_fails() {
        let (core, renderer) = ControlChannel::pair();
        drop(renderer);
        assert!(matches!(
            core.send(ControlMessage::Exit),
            Err(TelemetryError::Plot(_))
        ));
    }

    #[test]
    fn test_poll_closing_ignores_other_messages() {
        let (core, renderer) = ControlChannel::pair();
        let (queue, _points) = unbounded();
        let handle = PlotHandle::new("t", TransferMode::Linear, queue, core);

        renderer.send(ControlMessage::Clear).unwrap();
        renderer.send(ControlMessage::Closing).unwrap();
        assert!(!handle.poll_closing());
        assert!(handle.poll_closing());
        assert!(!handle.poll_closing());
    }

    #[test]
    fn test_window_message_wire_format() {
        let point = WindowMessage::Point(TransferPoint::new(3, Payload::Float(1.5)));
        assert_eq!(
            serde_json::to_string(&point).unwrap(),
            r#"{"point":{"x":3,"y":1.5}}"#
        );
        assert_eq!(serde_json::to_string(&WindowMessage::Clear).unwrap(), r#""clear""#);
        let back: WindowMessage = serde_json::from_str(r#""exit""#).unwrap();
        assert_eq!(back, WindowMessage::Exit);
    }

    #[test]
    fn test_channel_spawner() {
        let mut spawner = ChannelSpawner::new();
        let link = spawner.spawn("sine", TransferMode::Linear).unwrap();
        link.queue
            .send(TransferPoint::new(0, Payload::Int(1)))
            .unwrap();
        link.control.send(ControlMessage::Exit).unwrap();

        let spawned = spawner.take_spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].topic, "sine");
        assert_eq!(spawned[0].points.try_recv().unwrap().x, 0);
        assert_eq!(spawned[0].control.poll(), Some(ControlMessage::Exit));
    }
}

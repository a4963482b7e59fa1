//! Live-transfer registrations
//!
//! A registration ties a topic to an output queue. On creation it replays
//! the topic's history into the queue, then forwards every new sample as an
//! `[x, y]` point.

use super::topic::Topic;
use crate::types::{Payload, SampleMetadata, TopicKind};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Output sink of a live transfer
pub type TransferQueue = Sender<TransferPoint>;

/// How x coordinates are assigned to forwarded samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Sequential x coordinates assigned by a running cursor
    #[default]
    Linear,
    /// The sample's own index is the x coordinate
    Indexed,
}

impl From<TopicKind> for TransferMode {
    fn from(kind: TopicKind) -> Self {
        match kind {
            TopicKind::Linear => TransferMode::Linear,
            TopicKind::Indexed => TransferMode::Indexed,
        }
    }
}

/// One point emitted on a transfer queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPoint {
    pub x: u64,
    pub y: Payload,
}

impl TransferPoint {
    pub fn new(x: u64, y: Payload) -> Self {
        Self { x, y }
    }
}

/// Outcome of forwarding one sample to a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    /// The point was pushed onto the queue
    Delivered,
    /// Indexed registration, but the sample carried no index
    Dropped,
    /// The consumer side of the queue is gone
    Disconnected,
}

/// Active subscription for one topic
#[derive(Debug)]
pub struct TransferRegistration {
    queue: TransferQueue,
    /// Next x coordinate, linear mode only
    cursor: u64,
    mode: TransferMode,
}

impl TransferRegistration {
    pub fn new(queue: TransferQueue, mode: TransferMode) -> Self {
        Self {
            queue,
            cursor: 0,
            mode,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Push the topic's existing history onto the queue
    pub fn replay(&mut self, topic: &Topic) -> Forward {
        let mut outcome = Forward::Delivered;
        match self.mode {
            TransferMode::Indexed => {
                for (index, value) in topic.indexes() {
                    if self.send(*index as u64, value.clone()) == Forward::Disconnected {
                        outcome = Forward::Disconnected;
                    }
                }
            }
            TransferMode::Linear => {
                for value in topic.raw() {
                    if self.send_linear(value.clone()) == Forward::Disconnected {
                        outcome = Forward::Disconnected;
                    }
                }
            }
        }
        outcome
    }

    /// Forward one newly recorded sample
    pub fn forward(&mut self, payload: &Payload, metadata: &SampleMetadata) -> Forward {
        match (self.mode, metadata) {
            (TransferMode::Indexed, SampleMetadata::Indexed(index)) => {
                self.send(*index as u64, payload.clone())
            }
            (TransferMode::Indexed, SampleMetadata::None) => Forward::Dropped,
            (TransferMode::Linear, _) => self.send_linear(payload.clone()),
        }
    }

    fn send_linear(&mut self, value: Payload) -> Forward {
        let x = self.cursor;
        self.cursor += 1;
        self.send(x, value)
    }

    fn send(&self, x: u64, y: Payload) -> Forward {
        match self.queue.send(TransferPoint::new(x, y)) {
            Ok(()) => Forward::Delivered,
            Err(_) => Forward::Disconnected,
        }
    }
}

//! Topic store and live-transfer registry
//!
//! The [`TopicStore`] buffers every decoded sample per topic and forwards
//! new samples to the live transfers opened by plot windows.
//!
//! # Threading
//!
//! The store itself is a plain data structure. It is shared between the
//! runner thread (which calls [`TopicStore::process`]) and the console
//! thread (everything else) through the single session lock in
//! [`crate::state`], so the forwarding order on a transfer queue is exactly
//! the decode order.
//!
//! # Transfers
//!
//! [`TopicStore::transfer`] replays the existing history into the queue while
//! the lock is held, so no sample processed afterwards can overtake the
//! replay:
//!
//! - linear mode replays `raw` with x = 0, 1, 2, ... and keeps counting
//! - indexed mode replays the index map in ascending key order and forwards
//!   `[index, value]` for each new indexed sample

pub mod topic;
pub mod transfer;

pub use topic::Topic;
pub use transfer::{Forward, TransferMode, TransferPoint, TransferQueue, TransferRegistration};

use crate::types::{Payload, SampleMetadata, TopicKind, TopicSource};
use std::collections::HashMap;

/// Collection of topics keyed by name, plus their live transfers
#[derive(Debug, Default)]
pub struct TopicStore {
    /// Topics in creation order
    topics: Vec<Topic>,
    /// Name to position in `topics`
    lookup: HashMap<String, usize>,
    /// Active transfers by topic name
    transfers: HashMap<String, TransferRegistration>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic if absent. Returns whether it was created.
    pub fn create(&mut self, name: &str, source: TopicSource) -> bool {
        if self.lookup.contains_key(name) {
            return false;
        }
        self.lookup.insert(name.to_string(), self.topics.len());
        self.topics.push(Topic::new(name, source));
        tracing::debug!(target: "topics", topic = name, %source, "topic created");
        true
    }

    /// Record a sample, creating the topic on first use.
    ///
    /// Returns the forwarding outcome when a transfer is registered for the
    /// topic.
    pub fn process(
        &mut self,
        name: &str,
        payload: Payload,
        metadata: SampleMetadata,
    ) -> Option<Forward> {
        self.create(name, TopicSource::Remote);
        let position = self.lookup[name];
        let topic = &mut self.topics[position];

        let forward = self
            .transfers
            .get_mut(name)
            .map(|registration| registration.forward(&payload, &metadata));

        if !topic.record(payload, metadata) {
            tracing::warn!(
                target: "topics",
                topic = name,
                kind = %topic.kind(),
                "sample addressing does not match topic kind"
            );
        }

        match forward {
            Some(Forward::Dropped) => {
                tracing::debug!(
                    target: "topics",
                    topic = name,
                    "indexed transfer dropped a sample without index"
                );
            }
            Some(Forward::Disconnected) => {
                tracing::trace!(target: "topics", topic = name, "transfer consumer is gone");
            }
            _ => {}
        }

        forward
    }

    /// Names of the topics with the given source, in creation order
    pub fn ls(&self, source: TopicSource) -> Vec<String> {
        self.topics
            .iter()
            .filter(|t| t.source == source)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Names of all topics, in creation order
    pub fn ls_all(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }

    /// Last `amount` samples of a topic (`0` for all), `None` if unknown
    pub fn samples(&self, name: &str, amount: usize) -> Option<Vec<Payload>> {
        self.topic(name).map(|t| t.last(amount).to_vec())
    }

    /// Number of samples recorded on a topic, `0` if unknown
    pub fn count(&self, name: &str) -> usize {
        self.topic(name).map_or(0, Topic::len)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Borrow a topic
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.lookup.get(name).map(|&i| &self.topics[i])
    }

    /// Kind of a topic, `None` if unknown
    pub fn kind(&self, name: &str) -> Option<TopicKind> {
        self.topic(name).map(Topic::kind)
    }

    /// Whether the topic's samples carry indexes
    pub fn has_indexed_data(&self, name: &str) -> bool {
        self.topic(name).is_some_and(Topic::is_indexed)
    }

    /// Register a live transfer and replay the topic's history into `queue`.
    ///
    /// Returns `false` (and leaves the queue untouched) when a transfer is
    /// already active for the topic. The topic does not need to exist yet.
    pub fn transfer(&mut self, name: &str, queue: TransferQueue, mode: TransferMode) -> bool {
        if self.transfers.contains_key(name) {
            return false;
        }

        let mut registration = TransferRegistration::new(queue, mode);
        if let Some(topic) = self.topic(name) {
            registration.replay(topic);
        }
        tracing::debug!(
            target: "topics",
            topic = name,
            mode = ?mode,
            replayed = registration.cursor(),
            "transfer registered"
        );
        self.transfers.insert(name.to_string(), registration);
        true
    }

    /// Remove a transfer. Returns whether one was active.
    pub fn untransfer(&mut self, name: &str) -> bool {
        let removed = self.transfers.remove(name).is_some();
        if removed {
            tracing::debug!(target: "topics", topic = name, "transfer removed");
        }
        removed
    }

    pub fn intransfer(&self, name: &str) -> bool {
        self.transfers.contains_key(name)
    }

    /// Drop every topic and transfer
    pub fn clear(&mut self) {
        self.topics.clear();
        self.lookup.clear();
        self.transfers.clear();
        tracing::debug!(target: "topics", "store cleared");
    }

    /// Number of topics
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};

    fn drain(rx: &Receiver<TransferPoint>) -> Vec<(u64, Payload)> {
        rx.try_iter().map(|p| (p.x, p.y)).collect()
    }

    fn plain(store: &mut TopicStore, name: &str, v: i64) -> Option<Forward> {
        store.process(name, Payload::Int(v), SampleMetadata::None)
    }

    fn indexed(store: &mut TopicStore, name: &str, i: u32, v: i64) -> Option<Forward> {
        store.process(name, Payload::Int(v), SampleMetadata::Indexed(i))
    }

    #[test]
    fn test_process() {
        let t1 = "testTopic";
        let t2 = "otherTestTopic";
        let mut store = TopicStore::new();

        plain(&mut store, t1, 123);
        assert_eq!(store.ls(TopicSource::Remote), vec![t1]);

        store.process(t2, Payload::from("booyaa"), SampleMetadata::None);
        plain(&mut store, t1, 456);
        assert_eq!(store.ls(TopicSource::Remote), vec![t1, t2]);

        assert_eq!(store.samples(t1, 1), Some(vec![Payload::Int(456)]));
        assert_eq!(
            store.samples(t1, 0),
            Some(vec![Payload::Int(123), Payload::Int(456)])
        );
        assert_eq!(store.count(t1), 2);
        assert!(store.exists(t1));
        assert!(store.exists(t2));
        assert!(!store.exists("unknownTopic"));
    }

    #[test]
    fn test_samples_window() {
        let mut store = TopicStore::new();
        for v in [2, 3, 4] {
            plain(&mut store, "foo", v);
        }
        assert_eq!(
            store.samples("foo", 2),
            Some(vec![Payload::Int(3), Payload::Int(4)])
        );
        assert_eq!(store.samples("foo", 0).map(|s| s.len()), Some(3));
        assert_eq!(store.samples("foo", 99).map(|s| s.len()), Some(3));
        assert_eq!(store.count("foo"), 3);
    }

    #[test]
    fn test_unknown_topic_queries() {
        let store = TopicStore::new();
        assert_eq!(store.samples("nope", 1), None);
        assert_eq!(store.count("nope"), 0);
        assert_eq!(store.kind("nope"), None);
        assert!(!store.has_indexed_data("nope"));
        assert!(!store.intransfer("nope"));
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut store = TopicStore::new();
        assert!(store.create("baudspeed", TopicSource::Cli));
        assert!(!store.create("baudspeed", TopicSource::Remote));
        assert_eq!(store.topic("baudspeed").map(|t| t.source), Some(TopicSource::Cli));
        assert_eq!(store.count("baudspeed"), 0);
    }

    #[test]
    fn test_transfer_queue() {
        let t1 = "testTopic";
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();

        for v in [123, 456, 789] {
            plain(&mut store, t1, v);
        }
        assert!(rx.is_empty());

        assert!(store.transfer(t1, tx, TransferMode::Linear));
        assert_eq!(
            drain(&rx),
            vec![
                (0, Payload::Int(123)),
                (1, Payload::Int(456)),
                (2, Payload::Int(789)),
            ]
        );

        assert_eq!(plain(&mut store, t1, 111), Some(Forward::Delivered));
        assert_eq!(plain(&mut store, t1, 222), Some(Forward::Delivered));
        assert_eq!(
            drain(&rx),
            vec![(3, Payload::Int(111)), (4, Payload::Int(222))]
        );
    }

    #[test]
    fn test_transfer_queue_indexed_data() {
        let t1 = "testTopic";
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();

        indexed(&mut store, t1, 5, 123);
        indexed(&mut store, t1, 6, 456);
        indexed(&mut store, t1, 7, 789);
        assert!(store.has_indexed_data(t1));

        store.transfer(t1, tx, TransferMode::Indexed);
        assert!(store.intransfer(t1));
        assert_eq!(
            drain(&rx),
            vec![
                (5, Payload::Int(123)),
                (6, Payload::Int(456)),
                (7, Payload::Int(789)),
            ]
        );

        indexed(&mut store, t1, 5, 111);
        indexed(&mut store, t1, 6, 222);
        indexed(&mut store, t1, 7, 333);
        indexed(&mut store, t1, 8, 333);
        assert_eq!(
            drain(&rx),
            vec![
                (5, Payload::Int(111)),
                (6, Payload::Int(222)),
                (7, Payload::Int(333)),
                (8, Payload::Int(333)),
            ]
        );

        assert!(store.untransfer(t1));
        assert!(!store.intransfer(t1));

        indexed(&mut store, t1, 5, 111);
        indexed(&mut store, t1, 6, 222);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_indexed_overwrite_still_streams() {
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();
        indexed(&mut store, "t", 5, 123);
        indexed(&mut store, "t", 6, 456);
        store.transfer("t", tx, TransferMode::Indexed);
        indexed(&mut store, "t", 5, 111);

        assert_eq!(
            drain(&rx),
            vec![
                (5, Payload::Int(123)),
                (6, Payload::Int(456)),
                (5, Payload::Int(111)),
            ]
        );
        let topic = store.topic("t").unwrap();
        assert_eq!(topic.indexes()[&5], Payload::Int(111));
        assert_eq!(topic.len(), 3);
    }

    #[test]
    fn test_mode_mismatch_is_dropped_but_recorded() {
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();
        store.transfer("t", tx, TransferMode::Indexed);

        assert_eq!(plain(&mut store, "t", 9), Some(Forward::Dropped));
        assert!(rx.is_empty());
        assert_eq!(store.count("t"), 1);
    }

    #[test]
    fn test_transfer_is_idempotent() {
        let mut store = TopicStore::new();
        plain(&mut store, "t", 1);
        let (tx1, rx1) = unbounded();
        let (tx2, rx2) = unbounded();

        assert!(store.transfer("t", tx1, TransferMode::Linear));
        assert!(!store.transfer("t", tx2, TransferMode::Linear));
        plain(&mut store, "t", 2);

        assert_eq!(drain(&rx1), vec![(0, Payload::Int(1)), (1, Payload::Int(2))]);
        assert!(rx2.is_empty());
    }

    #[test]
    fn test_transfer_before_first_sample() {
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();
        assert!(store.transfer("later", tx, TransferMode::Linear));
        assert!(!store.exists("later"));

        plain(&mut store, "later", 10);
        assert_eq!(drain(&rx), vec![(0, Payload::Int(10))]);
    }

    #[test]
    fn test_untransfer_twice_is_noop() {
        let mut store = TopicStore::new();
        let (tx, _rx) = unbounded();
        store.transfer("t", tx, TransferMode::Linear);
        assert!(store.untransfer("t"));
        assert!(!store.untransfer("t"));
    }

    #[test]
    fn test_different_sources() {
        let t1 = "remoteTopic";
        let t2 = "systemTopic";
        let mut store = TopicStore::new();

        for v in [123, 456, 789] {
            plain(&mut store, t1, v);
        }
        store.create(t2, TopicSource::Cli);
        for v in [123, 456, 789] {
            plain(&mut store, t2, v);
        }

        assert_eq!(store.ls(TopicSource::Remote), vec![t1]);
        assert_eq!(store.ls(TopicSource::Cli), vec![t2]);
        assert_eq!(store.ls_all(), vec![t1, t2]);
        assert_eq!(store.count(t2), 3);
    }

    #[test]
    fn test_clear() {
        let mut store = TopicStore::new();
        let (tx, rx) = unbounded();
        plain(&mut store, "a", 1);
        store.create("speed", TopicSource::Cli);
        store.transfer("a", tx, TransferMode::Linear);
        drain(&rx);

        store.clear();

        assert!(store.is_empty());
        assert!(store.ls(TopicSource::Remote).is_empty());
        assert!(store.ls(TopicSource::Cli).is_empty());
        assert!(!store.exists("a"));
        assert!(!store.intransfer("a"));
        assert_eq!(store.count("a"), 0);

        plain(&mut store, "a", 2);
        assert!(rx.is_empty());
    }
}

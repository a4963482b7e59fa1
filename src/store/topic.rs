//! A single named data stream

use crate::types::{Payload, SampleMetadata, TopicKind, TopicSource};
use std::collections::BTreeMap;

/// State of one topic: arrival-ordered history plus the sparse indexed view
#[derive(Debug, Clone)]
pub struct Topic {
    /// Unique name within the store
    pub name: String,
    /// Origin tag, fixed at creation
    pub source: TopicSource,
    /// Decided by the first recorded sample
    kind: Option<TopicKind>,
    /// Every payload ever recorded, in arrival order
    raw: Vec<Payload>,
    /// Last payload written per index
    indexes: BTreeMap<u32, Payload>,
}

impl Topic {
    /// Create an empty topic
    pub fn new(name: impl Into<String>, source: TopicSource) -> Self {
        Self {
            name: name.into(),
            source,
            kind: None,
            raw: Vec::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Record a payload.
    ///
    /// Returns `false` when the sample's addressing disagrees with the kind
    /// fixed by the first sample. The sample is recorded either way.
    pub fn record(&mut self, payload: Payload, metadata: SampleMetadata) -> bool {
        let sample_kind = TopicKind::of(&metadata);
        let consistent = match self.kind {
            None => {
                self.kind = Some(sample_kind);
                true
            }
            Some(kind) => kind == sample_kind,
        };

        if let SampleMetadata::Indexed(index) = metadata {
            self.indexes.insert(index, payload.clone());
        }
        self.raw.push(payload);

        consistent
    }

    /// Kind of the topic; topics without samples yet read as linear
    pub fn kind(&self) -> TopicKind {
        self.kind.unwrap_or_default()
    }

    /// Whether the first sample carried an index
    pub fn is_indexed(&self) -> bool {
        self.kind() == TopicKind::Indexed
    }

    /// Full history in arrival order
    pub fn raw(&self) -> &[Payload] {
        &self.raw
    }

    /// Indexed view, ascending by index
    pub fn indexes(&self) -> &BTreeMap<u32, Payload> {
        &self.indexes
    }

    /// Last `amount` samples; `0` means the whole history
    pub fn last(&self, amount: usize) -> &[Payload] {
        if amount == 0 || amount >= self.raw.len() {
            &self.raw
        } else {
            &self.raw[self.raw.len() - amount..]
        }
    }

    /// Number of samples ever recorded
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

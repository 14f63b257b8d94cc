//! Dead-letter channel routing.
//!
//! A record that cannot be processed is forwarded unmodified to
//! `<channel><suffix>` (`.DLT` by default) on the same partition index, with
//! its source position and final failure cause attached as metadata.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
    error::{ConsumerError, Result},
    record::StreamRecord,
};

/// Suffix appended to a channel name to form its dead-letter channel.
pub const DEFAULT_DEAD_LETTER_SUFFIX: &str = ".DLT";

/// Name of the dead-letter channel for `source`.
pub fn dead_letter_channel(source: &str, suffix: &str) -> String {
    format!("{source}{suffix}")
}

/// Record redirected to a dead-letter channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEnvelope {
    /// Dead-letter channel name.
    pub channel: String,
    /// Partition index, identical to the source partition.
    pub partition: i32,
    /// Original key, unchanged.
    pub key: Option<Bytes>,
    /// Original payload, unchanged; `None` when the record was a tombstone.
    pub payload: Option<Bytes>,
    /// Channel the record was consumed from.
    pub source_channel: String,
    /// Offset the record had in the source partition.
    pub source_offset: i64,
    /// Final failure cause.
    pub cause: String,
}

impl DeadLetterEnvelope {
    /// Wraps `record` for its dead-letter channel.
    pub fn for_record(record: &StreamRecord, suffix: &str, cause: impl Into<String>) -> Self {
        Self {
            channel: dead_letter_channel(&record.channel, suffix),
            partition: record.partition,
            key: record.key.clone(),
            payload: record.payload.clone(),
            source_channel: record.channel.clone(),
            source_offset: record.offset,
            cause: cause.into(),
        }
    }
}

/// Publishes envelopes to their dead-letter channel.
#[async_trait::async_trait]
pub trait DeadLetterPublisher: Send + Sync + fmt::Debug {
    /// Publishes `envelope` to `envelope.channel`, partition `envelope.partition`.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::DeadLetterError` if the publish is not
    /// acknowledged.
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> Result<()>;
}

/// In-memory publisher that forwards envelopes to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<DeadLetterEnvelope>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiver that observes its output.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetterEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl DeadLetterPublisher for ChannelPublisher {
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> Result<()> {
        self.sender.send(envelope.clone()).map_err(|_| {
            ConsumerError::dead_letter(&envelope.channel, envelope.partition, "receiver dropped")
        })
    }
}

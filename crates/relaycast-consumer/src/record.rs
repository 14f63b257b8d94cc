//! Records read from an ordered, partitioned stream.

use std::fmt;

use bytes::Bytes;

/// One record consumed from a channel partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Channel (topic) the record was read from.
    pub channel: String,
    /// Partition index within the channel.
    pub partition: i32,
    /// Position of the record within the partition.
    pub offset: i64,
    /// Optional partitioning key.
    pub key: Option<Bytes>,
    /// Raw payload bytes; `None` for a tombstone.
    pub payload: Option<Bytes>,
}

impl StreamRecord {
    /// Creates a keyless record.
    pub fn new(
        channel: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            channel: channel.into(),
            partition,
            offset,
            key: None,
            payload: Some(payload.into()),
        }
    }

    /// Creates a keyless record without a payload.
    pub fn tombstone(channel: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self { channel: channel.into(), partition, offset, key: None, payload: None }
    }

    /// Sets the partitioning key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl fmt::Display for StreamRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.channel, self.partition, self.offset)
    }
}

//! Sources of stream records.
//!
//! A [`RecordSource`] hands out records of one partition in order and takes
//! commits once a record is settled. [`ChannelSource`] is the in-memory
//! implementation backed by a tokio channel; the Kafka source lives behind the
//! `kafka` feature.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{error::Result, record::StreamRecord};

/// Ordered supply of records with explicit position commits.
#[async_trait::async_trait]
pub trait RecordSource: Send {
    /// Returns the next record, or `None` when the source is exhausted.
    ///
    /// Must be cancellation safe: dropping the future loses no record.
    async fn next(&mut self) -> Result<Option<StreamRecord>>;

    /// Marks `record` as settled so it is not read again.
    async fn commit(&mut self, record: &StreamRecord) -> Result<()>;
}

/// Shared view of the commits made through a [`ChannelSource`].
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    commits: Arc<Mutex<Vec<(String, i32, i64)>>>,
}

impl CommitLog {
    fn push(&self, record: &StreamRecord) {
        if let Ok(mut commits) = self.commits.lock() {
            commits.push((record.channel.clone(), record.partition, record.offset));
        }
    }

    /// Committed (channel, partition, offset) triples in commit order.
    pub fn entries(&self) -> Vec<(String, i32, i64)> {
        self.commits.lock().map(|commits| commits.clone()).unwrap_or_default()
    }

    /// Next offset to read for a partition, or `None` if nothing was committed.
    pub fn position(&self, channel: &str, partition: i32) -> Option<i64> {
        self.entries()
            .into_iter()
            .filter(|(c, p, _)| c == channel && *p == partition)
            .map(|(_, _, offset)| offset + 1)
            .max()
    }

    /// Whether the record at `offset` was committed.
    pub fn contains(&self, channel: &str, partition: i32, offset: i64) -> bool {
        self.entries().iter().any(|(c, p, o)| c == channel && *p == partition && *o == offset)
    }
}

/// In-memory record source fed through a tokio channel.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<StreamRecord>,
    commits: CommitLog,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<StreamRecord>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver, commits: CommitLog::default() })
    }

    /// Creates a source pre-loaded with `records`; it ends after the last one.
    pub fn from_records(records: impl IntoIterator<Item = StreamRecord>) -> Self {
        let records: Vec<_> = records.into_iter().collect();
        let (sender, source) = Self::new(records.len());
        for record in records {
            // Capacity equals the record count, so this cannot fail.
            let _ = sender.try_send(record);
        }
        source
    }

    /// Handle to the commits made through this source.
    pub fn commit_log(&self) -> CommitLog {
        self.commits.clone()
    }
}

#[async_trait::async_trait]
impl RecordSource for ChannelSource {
    async fn next(&mut self) -> Result<Option<StreamRecord>> {
        Ok(self.receiver.recv().await)
    }

    async fn commit(&mut self, record: &StreamRecord) -> Result<()> {
        self.commits.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preloaded_source_yields_in_order_then_ends() {
        let mut source = ChannelSource::from_records([
            StreamRecord::new("orders", 0, 0, "a"),
            StreamRecord::new("orders", 0, 1, "b"),
        ]);

        assert_eq!(source.next().await.unwrap().unwrap().offset, 0);
        assert_eq!(source.next().await.unwrap().unwrap().offset, 1);
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commits_advance_position() {
        let (_sender, mut source) = ChannelSource::new(1);
        let log = source.commit_log();

        source.commit(&StreamRecord::new("orders", 2, 7, "x")).await.unwrap();
        source.commit(&StreamRecord::new("orders", 2, 8, "y")).await.unwrap();

        assert_eq!(log.position("orders", 2), Some(9));
        assert_eq!(log.position("orders", 0), None);
        assert!(log.contains("orders", 2, 7));
    }
}

//! Kafka adapters.
//!
//! [`KafkaSource`] reads one topic through a `StreamConsumer` with auto-commit
//! disabled and commits `offset + 1` per settled record.
//! [`KafkaDeadLetterPublisher`] forwards envelopes through a `FutureProducer`
//! to the same partition index of the dead-letter topic, carrying the source
//! position and cause as headers.

use std::{fmt, time::Duration};

use bytes::Bytes;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    Message, Offset, TopicPartitionList,
};
use tracing::{debug, info};

use crate::{
    dead_letter::{DeadLetterEnvelope, DeadLetterPublisher},
    error::{ConsumerError, Result},
    record::StreamRecord,
    source::RecordSource,
};

/// Header carrying the source topic of a dead-lettered record.
pub const SOURCE_CHANNEL_HEADER: &str = "relaycast-source-channel";
/// Header carrying the source offset of a dead-lettered record.
pub const SOURCE_OFFSET_HEADER: &str = "relaycast-source-offset";
/// Header carrying the final failure cause of a dead-lettered record.
pub const CAUSE_HEADER: &str = "relaycast-cause";

/// Connection settings for the Kafka adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// Consumer group id.
    pub group_id: String,
    /// Topic to consume.
    pub channel: String,
    /// Producer acknowledgement timeout for dead-letter publishes.
    pub publish_timeout: Duration,
}

impl KafkaConfig {
    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");
        config
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.publish_timeout.as_millis().to_string());
        config
    }
}

/// Record source over one Kafka topic.
pub struct KafkaSource {
    consumer: StreamConsumer,
    channel: String,
}

impl KafkaSource {
    /// Creates a consumer for `config.channel` and subscribes to it.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::ConfigurationError` if the client cannot be
    /// created or the subscription is rejected.
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = config
            .consumer_config()
            .create()
            .map_err(|e| ConsumerError::configuration(format!("kafka consumer: {e}")))?;

        consumer
            .subscribe(&[config.channel.as_str()])
            .map_err(|e| ConsumerError::configuration(format!("subscribe: {e}")))?;

        info!(channel = %config.channel, group_id = %config.group_id, "kafka source subscribed");

        Ok(Self { consumer, channel: config.channel.clone() })
    }
}

/// Copies a borrowed Kafka message into a [`StreamRecord`]. A null payload
/// stays `None`.
fn stream_record(
    topic: &str,
    partition: i32,
    offset: i64,
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
) -> StreamRecord {
    let mut record = match payload {
        Some(payload) => {
            StreamRecord::new(topic, partition, offset, Bytes::copy_from_slice(payload))
        },
        None => StreamRecord::tombstone(topic, partition, offset),
    };
    if let Some(key) = key {
        record = record.with_key(Bytes::copy_from_slice(key));
    }
    record
}

impl fmt::Debug for KafkaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaSource").field("channel", &self.channel).finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RecordSource for KafkaSource {
    async fn next(&mut self) -> Result<Option<StreamRecord>> {
        let message =
            self.consumer.recv().await.map_err(|e| ConsumerError::source_failed(e.to_string()))?;

        Ok(Some(stream_record(
            message.topic(),
            message.partition(),
            message.offset(),
            message.key(),
            message.payload(),
        )))
    }

    async fn commit(&mut self, record: &StreamRecord) -> Result<()> {
        let commit_error = |message: String| ConsumerError::CommitError {
            channel: record.channel.clone(),
            partition: record.partition,
            offset: record.offset,
            message,
        };

        let next = Offset::Offset(record.offset + 1);
        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(&record.channel, record.partition, next)
            .map_err(|e| commit_error(e.to_string()))?;

        self.consumer
            .commit(&positions, CommitMode::Async)
            .map_err(|e| commit_error(e.to_string()))?;

        debug!(record = %record, "position committed");
        Ok(())
    }
}

/// Dead-letter publisher over a Kafka producer.
#[derive(Clone)]
pub struct KafkaDeadLetterPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaDeadLetterPublisher {
    /// Wraps an existing producer. Default timeout is 5 seconds.
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer, timeout: Duration::from_secs(5) }
    }

    /// Creates a producer from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::ConfigurationError` if the producer cannot be
    /// created.
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| ConsumerError::configuration(format!("kafka producer: {e}")))?;

        Ok(Self::new(producer).with_timeout(config.publish_timeout))
    }

    /// Sets the acknowledgement timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for KafkaDeadLetterPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaDeadLetterPublisher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DeadLetterPublisher for KafkaDeadLetterPublisher {
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> Result<()> {
        let source_offset = envelope.source_offset.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: SOURCE_CHANNEL_HEADER,
                value: Some(envelope.source_channel.as_str()),
            })
            .insert(Header { key: SOURCE_OFFSET_HEADER, value: Some(source_offset.as_str()) })
            .insert(Header { key: CAUSE_HEADER, value: Some(envelope.cause.as_str()) });

        let mut record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(&envelope.channel).partition(envelope.partition).headers(headers);
        if let Some(payload) = &envelope.payload {
            record = record.payload(payload.as_ref());
        }
        if let Some(key) = &envelope.key {
            record = record.key(key.as_ref());
        }

        self.producer.send(record, self.timeout).await.map_err(|(e, _)| {
            ConsumerError::dead_letter(&envelope.channel, envelope.partition, e.to_string())
        })?;

        Ok(())
    }
}

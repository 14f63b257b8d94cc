//! Ordered stream consumption with bounded retries and dead-lettering.
//!
//! [`ConsumptionLayer`] reads one partition at a time from a
//! [`RecordSource`], hands each decoded event to an [`EventProcessor`], and
//! redirects records that keep failing to `<channel>.DLT` through a
//! [`DeadLetterPublisher`]. Positions are committed per record, and only once
//! the record is settled.
//!
//! In-memory adapters ([`ChannelSource`], [`ChannelPublisher`]) are always
//! available; the Kafka adapters need the `kafka` feature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dead_letter;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod layer;
pub mod processor;
pub mod record;
pub mod source;

pub use dead_letter::{
    dead_letter_channel, ChannelPublisher, DeadLetterEnvelope, DeadLetterPublisher,
    DEFAULT_DEAD_LETTER_SUFFIX,
};
pub use error::{ConsumerError, ProcessorError, Result};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaDeadLetterPublisher, KafkaSource};
pub use layer::{ConsumeOutcome, ConsumePolicy, ConsumeStats, ConsumptionLayer};
pub use processor::EventProcessor;
pub use record::StreamRecord;
pub use source::{ChannelSource, CommitLog, RecordSource};

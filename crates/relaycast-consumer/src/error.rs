//! Error types for stream consumption.

use thiserror::Error;

/// Result type alias for consumption operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors raised by the consumption machinery.
///
/// Processor failures are not in this list: they are retried and end in
/// dead-lettering, never surfacing past the layer.
#[derive(Debug, Clone, Error)]
pub enum ConsumerError {
    /// Record source failed to deliver the next record.
    #[error("record source error: {message}")]
    SourceError {
        /// Source error message
        message: String,
    },

    /// Position could not be committed.
    #[error("commit failed for {channel}[{partition}]@{offset}: {message}")]
    CommitError {
        /// Channel of the record
        channel: String,
        /// Partition of the record
        partition: i32,
        /// Offset of the record
        offset: i64,
        /// Commit error message
        message: String,
    },

    /// Dead-letter publish failed; the record must not be committed.
    #[error("dead-letter publish to {channel}[{partition}] failed: {message}")]
    DeadLetterError {
        /// Dead-letter channel
        channel: String,
        /// Partition published to
        partition: i32,
        /// Publish error message
        message: String,
    },

    /// Invalid consumer configuration.
    #[error("invalid consumer configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl ConsumerError {
    /// Creates a source error.
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::SourceError { message: message.into() }
    }

    /// Creates a dead-letter publish error.
    pub fn dead_letter(
        channel: impl Into<String>,
        partition: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::DeadLetterError { channel: channel.into(), partition, message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }
}

/// Failure reported by the business processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessorError {
    message: String,
}

impl ProcessorError {
    /// Creates a processor error.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

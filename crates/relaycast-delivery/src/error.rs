//! Error types for delivery infrastructure.
//!
//! Per-target delivery failures are not errors in this sense: they are
//! classified [`FailureDescriptor`](crate::classify::FailureDescriptor)s that
//! end in a retry or in terminal failure capture, and store outages end in the
//! emergency sink. `DeliveryError` only covers building the machinery.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while setting up delivery.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Invalid client or dispatcher configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }
}

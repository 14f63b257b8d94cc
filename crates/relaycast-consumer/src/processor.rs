//! Business processing seam.

use std::fmt;

use relaycast_core::Event;

use crate::error::ProcessorError;

/// Processes one decoded event.
///
/// Any error makes the consumption layer retry the event and eventually
/// dead-letter it. Implementations should be idempotent: an event can be
/// processed more than once.
#[async_trait::async_trait]
pub trait EventProcessor: Send + Sync + fmt::Debug {
    /// Processes `event`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError` if the event could not be processed.
    async fn process(&self, event: &Event) -> Result<(), ProcessorError>;
}

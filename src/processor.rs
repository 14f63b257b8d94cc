//! Processor that hands consumed events to the fan-out dispatcher.

use relaycast_consumer::{EventProcessor, ProcessorError};
use relaycast_core::Event;
use relaycast_delivery::FanOutDispatcher;
use tracing::debug;

/// Broadcasts every consumed event to all registered targets.
///
/// Returns as soon as the per-target deliveries are started. Delivery
/// failures are retried and captured on the delivery side and never fail the
/// consumed record.
#[derive(Debug, Clone)]
pub struct BroadcastProcessor {
    dispatcher: FanOutDispatcher,
}

impl BroadcastProcessor {
    /// Creates a processor over `dispatcher`.
    pub fn new(dispatcher: FanOutDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait::async_trait]
impl EventProcessor for BroadcastProcessor {
    async fn process(&self, event: &Event) -> Result<(), ProcessorError> {
        let handle = self.dispatcher.broadcast(event.clone());
        debug!(event_id = %event.id, targets = handle.len(), "event handed to dispatcher");
        Ok(())
    }
}

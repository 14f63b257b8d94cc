//! Terminal failure capture.
//!
//! Every (event, target) pair that ends in terminal failure passes through
//! [`TerminalFailureHandler::handle`] exactly once. The handler tries the
//! durable store first and falls back to the emergency sink on any error, so
//! a failure is always captured somewhere. It never returns an error.

use std::{fmt, sync::Arc};

use relaycast_core::{Clock, DeliveryTarget, Event, EventId, FailedDeliveryRecord};
use tracing::{error, info};

use crate::storage::FailureStore;

/// Tracing target emergency entries are written to.
pub const EMERGENCY_LOG_TARGET: &str = "relaycast::emergency";

/// Everything needed to recover a failure by hand when the store is down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyEntry {
    /// Target the event could not be delivered to.
    pub target: DeliveryTarget,
    /// Id of the undelivered event.
    pub event_id: EventId,
    /// Why the delivery was abandoned.
    pub reason: String,
    /// Why the failure record could not be stored.
    pub store_error: String,
    /// Rendering of the event sufficient to replay it.
    pub payload: String,
}

/// Last-resort output for failures the durable store could not take.
///
/// Assumed always available.
pub trait EmergencySink: Send + Sync + fmt::Debug {
    /// Writes one entry.
    fn write(&self, entry: &EmergencyEntry);
}

/// Emergency sink that emits an `error!` event on [`EMERGENCY_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmergencySink;

impl EmergencySink for TracingEmergencySink {
    fn write(&self, entry: &EmergencyEntry) {
        error!(
            target: EMERGENCY_LOG_TARGET,
            target_url = %entry.target,
            event_id = %entry.event_id,
            reason = %entry.reason,
            store_error = %entry.store_error,
            payload = %entry.payload,
            "failure record could not be persisted"
        );
    }
}

/// Where a terminal failure ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Appended to the durable store.
    Stored {
        /// Store-assigned record id
        id: i64,
    },
    /// Written to the emergency sink.
    Emergency,
}

/// Captures terminal delivery failures.
#[derive(Debug, Clone)]
pub struct TerminalFailureHandler {
    store: Arc<dyn FailureStore>,
    emergency: Arc<dyn EmergencySink>,
    clock: Arc<dyn Clock>,
}

impl TerminalFailureHandler {
    /// Creates a handler over the given store, sink and clock.
    pub fn new(
        store: Arc<dyn FailureStore>,
        emergency: Arc<dyn EmergencySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, emergency, clock }
    }

    /// Records that delivering `event` to `target` was abandoned.
    pub async fn handle(
        &self,
        target: &DeliveryTarget,
        event: &Event,
        reason: &str,
    ) -> CaptureOutcome {
        let record = match FailedDeliveryRecord::for_event(
            target.clone(),
            event,
            reason,
            self.clock.now_utc(),
        ) {
            Ok(record) => record,
            Err(e) => return self.fall_back(target, event, reason, &e.to_string()),
        };

        match self.store.append(record).await {
            Ok(id) => {
                info!(
                    target_url = %target,
                    event_id = %event.id,
                    record_id = id,
                    "failure record stored"
                );
                CaptureOutcome::Stored { id }
            },
            Err(e) => self.fall_back(target, event, reason, &e.to_string()),
        }
    }

    fn fall_back(
        &self,
        target: &DeliveryTarget,
        event: &Event,
        reason: &str,
        store_error: &str,
    ) -> CaptureOutcome {
        let payload = event.to_json().unwrap_or_else(|_| format!("{event:?}"));

        self.emergency.write(&EmergencyEntry {
            target: target.clone(),
            event_id: event.id,
            reason: reason.to_string(),
            store_error: store_error.to_string(),
            payload,
        });

        CaptureOutcome::Emergency
    }
}

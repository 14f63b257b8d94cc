//! Domain models for fan-out delivery.
//!
//! An [`Event`] is immutable once dispatched and is shared by every
//! per-target delivery. A [`DeliveryTarget`] is only an address; the registry
//! that produces them owns their meaning. A [`FailedDeliveryRecord`] is the
//! append-only trace left behind when a delivery to one target is abandoned.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Strongly-typed event identifier.
///
/// Wraps a UUID so it cannot be mixed up with other identifiers. The id
/// follows an event through every target it is delivered to and through any
/// failure record or log line it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Event broadcast to every registered target.
///
/// The wire form is camelCase JSON (`{"userId": "...", "message": "..."}`).
/// Producers that do not assign an id get a fresh one on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier of this event.
    #[serde(default)]
    pub id: EventId,
    /// Identifier of the user or system the event originated from.
    #[serde(rename = "userId", alias = "originatorId")]
    pub originator_id: String,
    /// Message body delivered to receivers.
    pub message: String,
}

impl Event {
    /// Creates an event with a freshly generated id.
    pub fn new(originator_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { id: EventId::new(), originator_id: originator_id.into(), message: message.into() }
    }

    /// Decodes an event from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if the bytes are not a valid event.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the event into its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Address of a downstream receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTarget(String);

impl DeliveryTarget {
    /// Creates a target from its address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeliveryTarget {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DeliveryTarget {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Durable record of a delivery that was abandoned.
///
/// Created exactly once per terminally-failed (event, target) pair and never
/// mutated afterwards. `remediated` is reserved for replay tooling and is
/// always written as `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeliveryRecord {
    /// Address of the target that could not be reached.
    pub target: DeliveryTarget,
    /// JSON serialization of the event as it was dispatched.
    pub payload_json: String,
    /// Human-readable reason the delivery was abandoned.
    pub reason: String,
    /// When the failure was captured.
    pub created_at: DateTime<Utc>,
    /// Whether the failure has since been remediated.
    pub remediated: bool,
}

impl FailedDeliveryRecord {
    /// Builds a record for `event`, serializing it as the payload.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if the event cannot be encoded.
    pub fn for_event(
        target: DeliveryTarget,
        event: &Event,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            target,
            payload_json: event.to_json()?,
            reason: reason.into(),
            created_at,
            remediated: false,
        })
    }
}

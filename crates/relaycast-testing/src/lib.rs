//! Shared test doubles for relaycast.
//!
//! Scripted collaborators for the delivery and consumption paths, proptest
//! strategies, and harnesses that wire them into a dispatcher or a
//! consumption layer. Every double records what it saw so tests can assert on
//! calls, timing and captured failures.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod consumer;
pub mod harness;
pub mod sender;
pub mod sinks;
pub mod strategies;

pub use consumer::{ProcessorScript, RecordingDeadLetterPublisher, ScriptedProcessor};
pub use harness::{ConsumerHarness, DeliveryHarness, DeliveryHarnessBuilder};
pub use relaycast_core::{Clock, RealClock, TestClock};
pub use relaycast_delivery::storage::mock::MockFailureStore;
pub use sender::{Reply, ScriptedSender, SendCall};
pub use sinks::RecordingEmergencySink;

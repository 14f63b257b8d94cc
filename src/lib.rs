//! Relaycast: consume events from an ordered stream and broadcast each one to
//! every registered target.
//!
//! The consumption side retries a failing record and dead-letters it once the
//! budget is spent. The delivery side retries each target independently on a
//! fixed schedule and captures every abandoned delivery in the failure store,
//! or the emergency log when the store is down.
//!
//! This crate holds the [`Config`], the [`Relay`] wiring and the
//! [`BroadcastProcessor`] joining the two sides.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod processor;
pub mod relay;

pub use config::{Config, LogFormat};
pub use processor::BroadcastProcessor;
pub use relay::{Relay, RelayBuilder};

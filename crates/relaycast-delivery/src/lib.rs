//! Reliable fan-out delivery.
//!
//! One event is delivered to many independent targets. Each target gets its
//! own bounded, fixed-backoff retry loop driven by a pure error classifier,
//! and any delivery that ends in terminal failure is captured durably, or in
//! the emergency log when the store itself is down.
//!
//! # Architecture
//!
//! 1. **Classify** - [`classify`] maps a normalized failure to retry or stop
//! 2. **Execute** - [`DeliveryExecutor`] drives one (event, target) pair
//! 3. **Fan out** - [`FanOutDispatcher`] spawns one executor task per target
//! 4. **Capture** - [`TerminalFailureHandler`] stores or emergency-logs the
//!    failure, exactly once per abandoned pair
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relaycast_core::{Event, RealClock};
//! use relaycast_delivery::{
//!     storage::mock::MockFailureStore, DeliveryExecutor, DispatcherConfig, FanOutDispatcher,
//!     HttpSender, RetryPolicy, StaticTargetRegistry, TerminalFailureHandler,
//!     TracingEmergencySink,
//! };
//!
//! # async fn example() -> relaycast_delivery::Result<()> {
//! let clock = Arc::new(RealClock::new());
//! let handler = TerminalFailureHandler::new(
//!     Arc::new(MockFailureStore::new()),
//!     Arc::new(TracingEmergencySink),
//!     clock.clone(),
//! );
//! let executor = DeliveryExecutor::new(
//!     Arc::new(HttpSender::with_defaults()?),
//!     handler,
//!     RetryPolicy::default(),
//!     clock,
//! );
//! let dispatcher = FanOutDispatcher::new(
//!     Arc::new(StaticTargetRegistry::new(["http://localhost:8083", "http://localhost:8084"])),
//!     executor,
//!     &DispatcherConfig::default(),
//! );
//!
//! let _ = dispatcher.broadcast(Event::new("user-1", "hello"));
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod failure;
pub mod registry;
pub mod retry;
pub mod storage;

pub use classify::{
    classify, Classification, ErrorCategory, FailureDescriptor, NoResponseCause, NoResponsePolicy,
};
pub use client::{ClientConfig, HttpSender, RequestSender, SendResponse};
pub use dispatcher::{BroadcastHandle, DispatchStats, DispatcherConfig, FanOutDispatcher};
pub use error::{DeliveryError, Result};
pub use executor::{AttemptState, DeliveryExecutor, DeliveryOutcome};
pub use failure::{
    CaptureOutcome, EmergencyEntry, EmergencySink, TerminalFailureHandler, TracingEmergencySink,
};
pub use registry::{StaticTargetRegistry, TargetRegistry};
pub use retry::{RetryDecision, RetryPolicy};
pub use storage::{FailureStore, PostgresFailureStore};

/// Default number of deliveries allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 64;

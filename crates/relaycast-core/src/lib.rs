//! Core domain types shared by every relaycast crate.
//!
//! Holds the event and delivery-target models, the failure record captured
//! when a delivery is abandoned, the error taxonomy for storage operations,
//! and the clock abstraction used to make retry timing testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{DeliveryTarget, Event, EventId, FailedDeliveryRecord};
pub use time::{Clock, RealClock, TestClock};

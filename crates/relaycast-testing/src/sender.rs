//! Scripted request sender.
//!
//! Each target gets a list of replies consumed one per send; the last entry
//! keeps repeating once the list runs out. Unscripted targets answer 200.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use relaycast_core::{DeliveryTarget, Event, EventId};
use relaycast_delivery::{FailureDescriptor, RequestSender, SendResponse};
use tokio::time::Instant;

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A response with this status. 2xx counts as delivered.
    Status(u16),
    /// A failure with no usable response.
    Failure(FailureDescriptor),
}

impl Reply {
    /// `200 OK`.
    pub fn ok() -> Self {
        Self::Status(200)
    }

    /// Request timed out.
    pub fn timeout() -> Self {
        Self::Failure(FailureDescriptor::Timeout)
    }

    /// Connection refused.
    pub fn refused() -> Self {
        Self::Failure(FailureDescriptor::refused())
    }
}

impl From<u16> for Reply {
    fn from(status: u16) -> Self {
        Self::Status(status)
    }
}

/// One recorded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCall {
    /// Target addressed.
    pub target: DeliveryTarget,
    /// Event sent.
    pub event_id: EventId,
    /// Attempt number passed by the executor.
    pub attempt: u32,
    /// Tokio time at which the send started.
    pub at: Instant,
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<DeliveryTarget, VecDeque<Reply>>,
    calls: Vec<SendCall>,
}

/// Request sender answering from per-target scripts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSender {
    state: Arc<Mutex<State>>,
    latency: Duration,
}

impl ScriptedSender {
    /// Creates a sender that answers 200 everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer by `latency` (tokio time).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Scripts the replies for `target`.
    #[must_use]
    pub fn script(
        self,
        target: impl Into<DeliveryTarget>,
        replies: impl IntoIterator<Item = impl Into<Reply>>,
    ) -> Self {
        let replies: VecDeque<Reply> = replies.into_iter().map(Into::into).collect();
        if let Ok(mut state) = self.state.lock() {
            state.scripts.insert(target.into(), replies);
        }
        self
    }

    /// Every send so far, in call order.
    pub fn calls(&self) -> Vec<SendCall> {
        self.state.lock().map(|state| state.calls.clone()).unwrap_or_default()
    }

    /// Sends made to `target`, in call order.
    pub fn calls_to(&self, target: &DeliveryTarget) -> Vec<SendCall> {
        self.calls().into_iter().filter(|call| &call.target == target).collect()
    }

    /// Gaps between consecutive sends to `target`.
    pub fn gaps(&self, target: &DeliveryTarget) -> Vec<Duration> {
        self.calls_to(target).windows(2).map(|pair| pair[1].at - pair[0].at).collect()
    }

    fn next_reply(&self, call: SendCall) -> Reply {
        let Ok(mut state) = self.state.lock() else {
            return Reply::ok();
        };

        let reply = match state.scripts.get_mut(&call.target) {
            Some(replies) if replies.len() > 1 => replies.pop_front(),
            Some(replies) => replies.front().cloned(),
            None => None,
        };
        state.calls.push(call);

        reply.unwrap_or_else(Reply::ok)
    }
}

#[async_trait::async_trait]
impl RequestSender for ScriptedSender {
    async fn send(
        &self,
        target: &DeliveryTarget,
        event: &Event,
        attempt: u32,
    ) -> Result<SendResponse, FailureDescriptor> {
        let reply = self.next_reply(SendCall {
            target: target.clone(),
            event_id: event.id,
            attempt,
            at: Instant::now(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Reply::Status(status) if (200..300).contains(&status) => {
                Ok(SendResponse { status, duration: self.latency })
            },
            Reply::Status(status) => Err(FailureDescriptor::status(status)),
            Reply::Failure(failure) => Err(failure),
        }
    }
}

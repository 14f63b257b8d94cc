//! Per-target delivery state machine.
//!
//! One [`DeliveryExecutor::deliver`] call drives a single (event, target)
//! pair from its first send to a final outcome:
//!
//! ```text
//! Pending -> Sent -> Succeeded
//!                 -> RetriableFailure -> (delay) -> Sent ...
//!                 -> TerminalFailure
//! ```
//!
//! Terminal failures, whether immediate or caused by an exhausted budget, are
//! handed to the [`TerminalFailureHandler`] exactly once. Nothing is shared
//! between calls, so executors for different targets never wait on each
//! other.

use std::sync::Arc;

use relaycast_core::{Clock, DeliveryTarget, Event};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    classify::{ErrorCategory, FailureDescriptor},
    client::RequestSender,
    failure::{CaptureOutcome, TerminalFailureHandler},
    retry::{RetryDecision, RetryPolicy},
};

/// Final result of delivering one event to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Target accepted the event.
    Delivered {
        /// Number of sends it took
        attempts: u32,
    },
    /// Delivery was abandoned and captured.
    Failed {
        /// Number of sends made
        attempts: u32,
        /// Reason handed to the failure handler
        reason: String,
        /// Where the failure was captured
        capture: CaptureOutcome,
    },
}

impl DeliveryOutcome {
    /// Whether the target accepted the event.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of sends made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// State of a delivery in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Waiting to send (initially or after a retry delay).
    Pending,
    /// Send in progress.
    Sent,
    /// Last send failed and will be retried.
    RetriableFailure,
    /// Target accepted the event.
    Succeeded,
    /// Delivery abandoned.
    TerminalFailure,
}

/// Transient bookkeeping for one (event, target) delivery. Never persisted.
#[derive(Debug, Clone)]
struct DeliveryAttempt {
    number: u32,
    state: AttemptState,
    last_failure: Option<FailureDescriptor>,
    budget: u32,
}

impl DeliveryAttempt {
    fn new(budget: u32) -> Self {
        Self { number: 0, state: AttemptState::Pending, last_failure: None, budget }
    }

    fn begin(&mut self) {
        debug_assert_eq!(self.state, AttemptState::Pending);
        self.number += 1;
        self.state = AttemptState::Sent;
    }

    fn succeed(&mut self) {
        self.state = AttemptState::Succeeded;
    }

    fn fail_retriable(&mut self, failure: FailureDescriptor) {
        self.state = AttemptState::RetriableFailure;
        self.last_failure = Some(failure);
    }

    fn resume(&mut self) {
        self.state = AttemptState::Pending;
    }

    fn fail_terminal(&mut self, failure: FailureDescriptor) {
        self.state = AttemptState::TerminalFailure;
        self.last_failure = Some(failure);
    }

    fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.number)
    }
}

/// Delivers one event to one target under a retry policy.
#[derive(Debug, Clone)]
pub struct DeliveryExecutor {
    sender: Arc<dyn RequestSender>,
    failure_handler: TerminalFailureHandler,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl DeliveryExecutor {
    /// Creates an executor.
    pub fn new(
        sender: Arc<dyn RequestSender>,
        failure_handler: TerminalFailureHandler,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { sender, failure_handler, policy, clock }
    }

    /// Retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `event` to `target`, retrying and capturing failure as needed.
    ///
    /// Never returns an error: every failure ends in the failure handler and
    /// is reported through [`DeliveryOutcome::Failed`].
    pub async fn deliver(&self, target: &DeliveryTarget, event: &Event) -> DeliveryOutcome {
        let mut attempt = DeliveryAttempt::new(self.policy.max_attempts);

        loop {
            attempt.begin();

            let span = info_span!(
                "delivery_attempt",
                target_url = %target,
                event_id = %event.id,
                attempt = attempt.number
            );

            let result = self.sender.send(target, event, attempt.number).instrument(span).await;

            let failure = match result {
                Ok(response) => {
                    attempt.succeed();
                    debug!(
                        target_url = %target,
                        event_id = %event.id,
                        attempt = attempt.number,
                        status = response.status,
                        "event delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt.number };
                },
                Err(failure) => failure,
            };

            match self.policy.decide(attempt.number, &failure) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        target_url = %target,
                        event_id = %event.id,
                        attempt = attempt.number,
                        remaining_retries = attempt.remaining(),
                        category = %failure.category(),
                        error = %failure,
                        "transient delivery failure, retrying"
                    );
                    attempt.fail_retriable(failure);
                    self.clock.sleep(delay).await;
                    attempt.resume();
                },
                RetryDecision::GiveUp { reason } => {
                    attempt.fail_terminal(failure);
                    log_terminal(target, event, &attempt, &reason);

                    let capture = self.failure_handler.handle(target, event, &reason).await;
                    return DeliveryOutcome::Failed { attempts: attempt.number, reason, capture };
                },
            }
        }
    }
}

fn log_terminal(target: &DeliveryTarget, event: &Event, attempt: &DeliveryAttempt, reason: &str) {
    let attempts = attempt.number;
    let Some(failure) = attempt.last_failure.as_ref() else {
        return;
    };

    match failure.category() {
        ErrorCategory::ClientRequestError => warn!(
            target_url = %target,
            event_id = %event.id,
            attempts,
            error = %failure,
            "target rejected event; request requires correction, not retrying"
        ),
        ErrorCategory::UnreachableTarget => warn!(
            target_url = %target,
            event_id = %event.id,
            attempts,
            error = %failure,
            "target unreachable, not retrying"
        ),
        ErrorCategory::UnknownError => error!(
            target_url = %target,
            event_id = %event.id,
            attempts,
            error = ?failure,
            "unclassified delivery failure, not retrying"
        ),
        ErrorCategory::TransientServerError | ErrorCategory::NetworkTimeout => error!(
            target_url = %target,
            event_id = %event.id,
            attempts,
            reason,
            "delivery retries exhausted"
        ),
    }
    info!(target_url = %target, event_id = %event.id, "capturing terminal delivery failure");
}

//! Fixed-backoff retry policy for per-target delivery.
//!
//! A delivery gets `max_attempts` sends in total. Between two attempts whose
//! failure classified as retriable the executor waits `delay`. There is no
//! growth and no jitter: every target retries on the same cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{classify, Classification, FailureDescriptor, NoResponsePolicy};

/// Retry policy configuration for per-target delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of send attempts, including the first one.
    pub max_attempts: u32,

    /// Fixed delay between consecutive attempts.
    pub delay: Duration,

    /// Treatment of failures where no response was received.
    pub no_response: NoResponsePolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(1),
            no_response: NoResponsePolicy::default(),
        }
    }
}

/// What the executor should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then send again.
    Retry {
        /// How long to wait before the next attempt
        delay: Duration,
    },
    /// Stop and hand the failure to the terminal failure handler.
    GiveUp {
        /// Reason recorded with the failure
        reason: String,
    },
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay, ..Self::default() }
    }

    /// Overrides the no-response policy.
    #[must_use]
    pub fn with_no_response(mut self, no_response: NoResponsePolicy) -> Self {
        self.no_response = no_response;
        self
    }

    /// Number of retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Decides whether to retry after `attempt` (1-based) failed.
    ///
    /// Terminal classifications give up immediately with the failure itself
    /// as the reason. Exhausting the budget on a retriable failure gives up
    /// with a reason naming the attempt count and the last failure.
    pub fn decide(&self, attempt: u32, failure: &FailureDescriptor) -> RetryDecision {
        match classify(failure, self.no_response) {
            Classification::Terminal => RetryDecision::GiveUp { reason: failure.to_string() },
            Classification::Retriable if attempt >= self.max_attempts => RetryDecision::GiveUp {
                reason: format!("retries exhausted after {attempt} attempts: {failure}"),
            },
            Classification::Retriable => RetryDecision::Retry { delay: self.delay },
        }
    }
}

//! Failure classification for delivery attempts.
//!
//! Transport errors are normalized into a [`FailureDescriptor`] by the request
//! sender. [`classify`] turns a descriptor into a retry decision. It is pure
//! and total, so retry policy can be tested without any transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized description of a failed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDescriptor {
    /// Target answered with a non-success status code.
    ResponseReceived {
        /// HTTP status code returned by the target
        status: u16,
    },
    /// No response arrived at all.
    NoResponse(NoResponseCause),
    /// Request did not complete within the per-attempt timeout.
    Timeout,
}

/// Why no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoResponseCause {
    /// Target actively refused the connection.
    ConnectionRefused,
    /// Target could not be reached (DNS, routing, reset during connect).
    Unreachable,
    /// Anything else the transport reported.
    Other(String),
}

/// Retry decision for a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Attempt again after the fixed delay if budget remains.
    Retriable,
    /// Stop and capture the failure.
    Terminal,
}

/// How to treat failures where no response was received.
///
/// Response-received failures are classified the same way under every
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResponsePolicy {
    /// Timeouts retry; refused, unreachable and other causes are terminal.
    #[default]
    RetryTimeouts,
    /// Every no-response failure retries except a detected refusal.
    RetryUnlessRefused,
    /// Every no-response failure, timeouts included, is terminal.
    NeverRetry,
}

/// Category of delivery failure for logs and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 5xx or 429.
    TransientServerError,
    /// Any other 4xx.
    ClientRequestError,
    /// Connection refused or target confirmed down.
    UnreachableTarget,
    /// Per-attempt timeout elapsed.
    NetworkTimeout,
    /// Everything the taxonomy does not recognize.
    UnknownError,
}

impl From<&FailureDescriptor> for ErrorCategory {
    fn from(descriptor: &FailureDescriptor) -> Self {
        match descriptor {
            FailureDescriptor::ResponseReceived { status: 429 | 500..=599 } => {
                Self::TransientServerError
            },
            FailureDescriptor::ResponseReceived { status: 400..=499 } => Self::ClientRequestError,
            FailureDescriptor::ResponseReceived { .. } => Self::UnknownError,
            FailureDescriptor::NoResponse(
                NoResponseCause::ConnectionRefused | NoResponseCause::Unreachable,
            ) => Self::UnreachableTarget,
            FailureDescriptor::NoResponse(NoResponseCause::Other(_)) => Self::UnknownError,
            FailureDescriptor::Timeout => Self::NetworkTimeout,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientServerError => write!(f, "transient_server_error"),
            Self::ClientRequestError => write!(f, "client_request_error"),
            Self::UnreachableTarget => write!(f, "unreachable_target"),
            Self::NetworkTimeout => write!(f, "network_timeout"),
            Self::UnknownError => write!(f, "unknown_error"),
        }
    }
}

impl FailureDescriptor {
    /// Creates a response-received descriptor.
    pub fn status(status: u16) -> Self {
        Self::ResponseReceived { status }
    }

    /// Creates a connection-refused descriptor.
    pub fn refused() -> Self {
        Self::NoResponse(NoResponseCause::ConnectionRefused)
    }

    /// Creates an unreachable-target descriptor.
    pub fn unreachable() -> Self {
        Self::NoResponse(NoResponseCause::Unreachable)
    }

    /// Creates a descriptor for an unrecognized transport failure.
    pub fn other(cause: impl Into<String>) -> Self {
        Self::NoResponse(NoResponseCause::Other(cause.into()))
    }

    /// Returns the failure category.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from(self)
    }

    /// Returns the status code if a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ResponseReceived { status } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for FailureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseReceived { status } => match canonical_reason(*status) {
                Some(reason) => write!(f, "HTTP {status} {reason}"),
                None => write!(f, "HTTP {status}"),
            },
            Self::NoResponse(NoResponseCause::ConnectionRefused) => {
                write!(f, "target unreachable: connection refused")
            },
            Self::NoResponse(NoResponseCause::Unreachable) => {
                write!(f, "target unreachable: no route to target")
            },
            Self::NoResponse(NoResponseCause::Other(cause)) => write!(f, "no response: {cause}"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

/// Decides whether a failure is worth retrying.
///
/// 5xx and 429 retry, other 4xx are terminal, anything outside 400..=599 is
/// unknown and terminal. No-response failures follow `policy`.
pub fn classify(descriptor: &FailureDescriptor, policy: NoResponsePolicy) -> Classification {
    match descriptor {
        FailureDescriptor::ResponseReceived { status: 429 | 500..=599 } => {
            Classification::Retriable
        },
        FailureDescriptor::ResponseReceived { .. } => Classification::Terminal,
        FailureDescriptor::Timeout => match policy {
            NoResponsePolicy::RetryTimeouts | NoResponsePolicy::RetryUnlessRefused => {
                Classification::Retriable
            },
            NoResponsePolicy::NeverRetry => Classification::Terminal,
        },
        FailureDescriptor::NoResponse(cause) => match (policy, cause) {
            (NoResponsePolicy::RetryUnlessRefused, NoResponseCause::ConnectionRefused) => {
                Classification::Terminal
            },
            (NoResponsePolicy::RetryUnlessRefused, _) => Classification::Retriable,
            (NoResponsePolicy::RetryTimeouts | NoResponsePolicy::NeverRetry, _) => {
                Classification::Terminal
            },
        },
    }
}

fn canonical_reason(status: u16) -> Option<&'static str> {
    reqwest::StatusCode::from_u16(status).ok().and_then(|code| code.canonical_reason())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: [NoResponsePolicy; 3] = [
        NoResponsePolicy::RetryTimeouts,
        NoResponsePolicy::RetryUnlessRefused,
        NoResponsePolicy::NeverRetry,
    ];

    #[test]
    fn default_policy_matches_decision_table() {
        let policy = NoResponsePolicy::default();

        assert_eq!(classify(&FailureDescriptor::status(500), policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::status(503), policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::status(429), policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::status(400), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::status(404), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::refused(), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::unreachable(), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::Timeout, policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::other("tls"), policy), Classification::Terminal);
    }

    #[test]
    fn statuses_outside_error_range_are_terminal() {
        for status in [100, 204, 302, 304, 600] {
            for policy in POLICIES {
                assert_eq!(
                    classify(&FailureDescriptor::status(status), policy),
                    Classification::Terminal,
                    "status {status} under {policy:?}"
                );
            }
        }
    }

    #[test]
    fn retry_unless_refused_retries_other_no_response_causes() {
        let policy = NoResponsePolicy::RetryUnlessRefused;

        assert_eq!(classify(&FailureDescriptor::refused(), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::unreachable(), policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::other("reset"), policy), Classification::Retriable);
        assert_eq!(classify(&FailureDescriptor::Timeout, policy), Classification::Retriable);
    }

    #[test]
    fn never_retry_treats_timeouts_as_terminal() {
        let policy = NoResponsePolicy::NeverRetry;

        assert_eq!(classify(&FailureDescriptor::Timeout, policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::unreachable(), policy), Classification::Terminal);
        assert_eq!(classify(&FailureDescriptor::status(502), policy), Classification::Retriable);
    }

    #[test]
    fn categories_mapped_correctly() {
        assert_eq!(
            FailureDescriptor::status(502).category(),
            ErrorCategory::TransientServerError
        );
        assert_eq!(
            FailureDescriptor::status(429).category(),
            ErrorCategory::TransientServerError
        );
        assert_eq!(FailureDescriptor::status(422).category(), ErrorCategory::ClientRequestError);
        assert_eq!(FailureDescriptor::refused().category(), ErrorCategory::UnreachableTarget);
        assert_eq!(FailureDescriptor::unreachable().category(), ErrorCategory::UnreachableTarget);
        assert_eq!(FailureDescriptor::Timeout.category(), ErrorCategory::NetworkTimeout);
        assert_eq!(FailureDescriptor::other("?").category(), ErrorCategory::UnknownError);
        assert_eq!(FailureDescriptor::status(302).category(), ErrorCategory::UnknownError);
    }

    #[test]
    fn reasons_are_human_readable() {
        assert_eq!(FailureDescriptor::status(503).to_string(), "HTTP 503 Service Unavailable");
        assert_eq!(FailureDescriptor::status(404).to_string(), "HTTP 404 Not Found");
        assert_eq!(FailureDescriptor::status(599).to_string(), "HTTP 599");
        assert_eq!(
            FailureDescriptor::refused().to_string(),
            "target unreachable: connection refused"
        );
        assert_eq!(FailureDescriptor::Timeout.to_string(), "request timed out");
    }

    #[test]
    fn policy_deserializes_from_snake_case() {
        let policy: NoResponsePolicy = serde_json::from_str("\"retry_unless_refused\"").unwrap();
        assert_eq!(policy, NoResponsePolicy::RetryUnlessRefused);
        assert_eq!(
            serde_json::to_string(&NoResponsePolicy::NeverRetry).unwrap(),
            "\"never_retry\""
        );
    }

    #[test]
    fn category_display_format() {
        assert_eq!(ErrorCategory::TransientServerError.to_string(), "transient_server_error");
        assert_eq!(ErrorCategory::UnreachableTarget.to_string(), "unreachable_target");
    }
}

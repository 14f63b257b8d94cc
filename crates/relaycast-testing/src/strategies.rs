//! Proptest strategies for delivery inputs.

use proptest::prelude::{prop_oneof, Just, Strategy};
use relaycast_core::Event;
use relaycast_delivery::{FailureDescriptor, NoResponsePolicy};

/// Any status code that should be retried: 5xx or 429.
pub fn retriable_status() -> impl Strategy<Value = u16> {
    prop_oneof![
        4 => 500u16..=599,
        1 => Just(429u16),
    ]
}

/// Any 4xx other than 429.
pub fn terminal_client_status() -> impl Strategy<Value = u16> {
    (400u16..=499).prop_filter("429 is retriable", |status| *status != 429)
}

/// Any status outside 200..=599.
pub fn unclassified_status() -> impl Strategy<Value = u16> {
    prop_oneof![0u16..200, 600u16..=999]
}

/// Every no-response policy.
pub fn no_response_policy() -> impl Strategy<Value = NoResponsePolicy> {
    prop_oneof![
        Just(NoResponsePolicy::RetryTimeouts),
        Just(NoResponsePolicy::RetryUnlessRefused),
        Just(NoResponsePolicy::NeverRetry),
    ]
}

/// Any failure descriptor, weighted toward received responses.
pub fn failure_descriptor() -> impl Strategy<Value = FailureDescriptor> {
    prop_oneof![
        6 => (300u16..=599).prop_map(FailureDescriptor::status),
        1 => Just(FailureDescriptor::Timeout),
        1 => Just(FailureDescriptor::refused()),
        1 => Just(FailureDescriptor::unreachable()),
        1 => "[a-z ]{1,20}".prop_map(FailureDescriptor::other),
    ]
}

/// Events with arbitrary originator and message text.
pub fn event() -> impl Strategy<Value = Event> {
    ("[a-zA-Z0-9-]{1,16}", "\\PC{0,64}")
        .prop_map(|(originator, message): (String, String)| Event::new(originator, message))
}

//! Integration tests for the per-target delivery executor.
//!
//! Runs on paused tokio time with the real clock, so retry gaps are measured
//! exactly without waiting.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use relaycast_core::{DeliveryTarget, Event};
use relaycast_delivery::{CaptureOutcome, DeliveryOutcome, NoResponsePolicy, RetryPolicy};
use relaycast_testing::{DeliveryHarness, MockFailureStore, Reply, ScriptedSender};

const TARGET: &str = "http://localhost:8085";

fn harness(replies: Vec<Reply>) -> DeliveryHarness {
    DeliveryHarness::builder()
        .target(TARGET)
        .sender(ScriptedSender::new().script(TARGET, replies))
        .build()
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_one_second_apart_until_success() {
    let harness = harness([vec![Reply::Status(503); 3], vec![Reply::ok()]].concat());
    let target = DeliveryTarget::new(TARGET);

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 4 });
    assert_eq!(harness.sender.gaps(&target), vec![Duration::from_secs(1); 3]);
    let attempts: Vec<_> = harness.sender.calls_to(&target).iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3, 4]);
    assert!(harness.store.records().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_records_exactly_one_failure() {
    let harness = harness(vec![Reply::Status(503)]);
    let target = DeliveryTarget::new(TARGET);
    let event = Event::new("user-1", "hello");

    let outcome = harness.executor.deliver(&target, &event).await;

    match outcome {
        DeliveryOutcome::Failed { attempts, reason, capture } => {
            assert_eq!(attempts, 4);
            assert_eq!(reason, "retries exhausted after 4 attempts: HTTP 503 Service Unavailable");
            assert_eq!(capture, CaptureOutcome::Stored { id: 1 });
        },
        other => panic!("expected failure, got {other:?}"),
    }

    let records = harness.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, target);
    assert_eq!(Event::from_json(records[0].payload_json.as_bytes()).unwrap(), event);
    assert_eq!(harness.sender.calls_to(&target).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn client_error_is_not_retried() {
    let harness = harness(vec![Reply::Status(404)]);
    let target = DeliveryTarget::new(TARGET);

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome.attempts(), 1);
    let records = harness.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, "HTTP 404 Not Found");
}

#[tokio::test(start_paused = true)]
async fn rate_limited_response_is_retried() {
    let harness = harness(vec![Reply::Status(429), Reply::ok()]);
    let target = DeliveryTarget::new(TARGET);

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_by_default() {
    let harness = harness(vec![Reply::timeout(), Reply::ok()]);
    let target = DeliveryTarget::new(TARGET);

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_terminal_by_default() {
    let harness = harness(vec![Reply::refused(), Reply::ok()]);
    let target = DeliveryTarget::new(TARGET);

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert!(!outcome.is_delivered());
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(
        harness.store.records().await[0].reason,
        "target unreachable: connection refused"
    );
}

#[tokio::test(start_paused = true)]
async fn never_retry_policy_gives_up_on_timeout() {
    let target = DeliveryTarget::new(TARGET);
    let harness = DeliveryHarness::builder()
        .target(TARGET)
        .sender(ScriptedSender::new().script(TARGET, [Reply::timeout(), Reply::ok()]))
        .policy(RetryPolicy::default().with_no_response(NoResponsePolicy::NeverRetry))
        .build();

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(harness.store.records().await[0].reason, "request timed out");
}

#[tokio::test(start_paused = true)]
async fn custom_budget_and_delay_are_honored() {
    let target = DeliveryTarget::new(TARGET);
    let harness = DeliveryHarness::builder()
        .target(TARGET)
        .sender(ScriptedSender::new().script(TARGET, [500u16]))
        .policy(RetryPolicy::fixed(2, Duration::from_millis(250)))
        .build();

    let outcome = harness.executor.deliver(&target, &Event::new("user-1", "hello")).await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(harness.sender.gaps(&target), vec![Duration::from_millis(250)]);
}

#[tokio::test(start_paused = true)]
async fn store_outage_reaches_emergency_sink() {
    let target = DeliveryTarget::new(TARGET);
    let event = Event::new("user-1", "hello");
    let harness = DeliveryHarness::builder()
        .target(TARGET)
        .sender(ScriptedSender::new().script(TARGET, [404u16]))
        .store(MockFailureStore::unavailable("connection pool exhausted"))
        .build();

    let outcome = harness.executor.deliver(&target, &event).await;

    match outcome {
        DeliveryOutcome::Failed { capture, .. } => assert_eq!(capture, CaptureOutcome::Emergency),
        other => panic!("expected failure, got {other:?}"),
    }
    let entries = harness.emergency.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, target);
    assert_eq!(entries[0].event_id, event.id);
    assert_eq!(entries[0].reason, "HTTP 404 Not Found");
    assert!(entries[0].store_error.contains("connection pool exhausted"));
}

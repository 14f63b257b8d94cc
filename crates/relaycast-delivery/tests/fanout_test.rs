//! Integration tests for concurrent fan-out.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::{collections::HashMap, time::Duration};

use relaycast_core::{DeliveryTarget, Event};
use relaycast_delivery::{DeliveryOutcome, DispatchStats};
use relaycast_testing::{DeliveryHarness, Reply, ScriptedSender};
use tokio::time::Instant;

const HEALTHY: &str = "http://localhost:8083";
const REJECTING: &str = "http://localhost:8084";
const RECOVERING: &str = "http://localhost:8085";

#[tokio::test(start_paused = true)]
async fn independent_targets_reach_independent_outcomes() {
    let harness = DeliveryHarness::builder()
        .targets([HEALTHY, REJECTING, RECOVERING])
        .sender(
            ScriptedSender::new()
                .script(HEALTHY, [200u16])
                .script(REJECTING, [404u16])
                .script(RECOVERING, [503u16, 503, 503, 200]),
        )
        .build();
    let event = Event::new("user-42", "fan out");
    let start = Instant::now();

    let handle = harness.dispatcher.broadcast(event.clone());
    assert_eq!(handle.len(), 3);
    assert_eq!(handle.event_id(), event.id);

    let outcomes: HashMap<_, _> = handle.wait().await.into_iter().collect();

    assert_eq!(outcomes[&DeliveryTarget::new(HEALTHY)], DeliveryOutcome::Delivered { attempts: 1 });
    assert_eq!(outcomes[&DeliveryTarget::new(REJECTING)].attempts(), 1);
    assert!(!outcomes[&DeliveryTarget::new(REJECTING)].is_delivered());
    assert_eq!(
        outcomes[&DeliveryTarget::new(RECOVERING)],
        DeliveryOutcome::Delivered { attempts: 4 }
    );

    let records = harness.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, DeliveryTarget::new(REJECTING));
    assert_eq!(records[0].reason, "HTTP 404 Not Found");

    for target in [HEALTHY, REJECTING, RECOVERING] {
        let first = &harness.sender.calls_to(&DeliveryTarget::new(target))[0];
        assert_eq!(first.at, start, "{target} was not started immediately");
    }
    assert_eq!(
        harness.sender.gaps(&DeliveryTarget::new(RECOVERING)),
        vec![Duration::from_secs(1); 3]
    );
}

#[tokio::test(start_paused = true)]
async fn healthy_failing_and_refusing_targets_settle_independently() {
    let harness = DeliveryHarness::builder()
        .targets([HEALTHY, REJECTING, RECOVERING])
        .sender(
            ScriptedSender::new()
                .script(HEALTHY, [200u16])
                .script(REJECTING, [503u16])
                .script(RECOVERING, [Reply::refused()]),
        )
        .build();
    let start = Instant::now();

    let handle = harness.dispatcher.broadcast(Event::new("user-7", "a b c"));
    let outcomes: HashMap<_, _> = handle.wait().await.into_iter().collect();

    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert!(outcomes[&DeliveryTarget::new(HEALTHY)].is_delivered());
    assert_eq!(outcomes[&DeliveryTarget::new(REJECTING)].attempts(), 4);
    assert_eq!(outcomes[&DeliveryTarget::new(RECOVERING)].attempts(), 1);

    assert!(harness.store.records_for(&DeliveryTarget::new(HEALTHY)).await.is_empty());

    let failing = harness.store.records_for(&DeliveryTarget::new(REJECTING)).await;
    assert_eq!(failing.len(), 1);
    assert!(failing[0].reason.contains("503"), "reason was {}", failing[0].reason);
    assert_eq!(
        harness.sender.gaps(&DeliveryTarget::new(REJECTING)),
        vec![Duration::from_secs(1); 3]
    );

    let refused = harness.store.records_for(&DeliveryTarget::new(RECOVERING)).await;
    assert_eq!(refused.len(), 1);
    assert!(refused[0].reason.contains("unreachable"), "reason was {}", refused[0].reason);
    let refused_calls = harness.sender.calls_to(&DeliveryTarget::new(RECOVERING));
    assert_eq!(refused_calls.len(), 1);
    assert_eq!(refused_calls[0].at, start);

    assert!(harness.emergency.is_empty());
}

#[tokio::test(start_paused = true)]
async fn store_outage_during_retries_only_affects_the_late_failure() {
    let harness = DeliveryHarness::builder()
        .targets([HEALTHY, REJECTING, RECOVERING])
        .sender(
            ScriptedSender::new()
                .script(HEALTHY, [200u16])
                .script(REJECTING, [503u16])
                .script(RECOVERING, [Reply::refused()]),
        )
        .build();

    let handle = harness.dispatcher.broadcast(Event::new("user-7", "a b c"));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    harness.store.fail_with("database unavailable").await;
    let outcomes: HashMap<_, _> = handle.wait().await.into_iter().collect();

    assert!(outcomes[&DeliveryTarget::new(HEALTHY)].is_delivered());
    assert!(!outcomes[&DeliveryTarget::new(RECOVERING)].is_delivered());

    let records = harness.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, DeliveryTarget::new(RECOVERING));

    let entries = harness.emergency.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, DeliveryTarget::new(REJECTING));
    assert!(entries[0].reason.contains("503"));
    assert!(entries[0].store_error.contains("database unavailable"));
    assert_eq!(harness.dispatcher.stats().emergency_captures, 1);
}

#[tokio::test(start_paused = true)]
async fn broadcast_returns_before_any_delivery_completes() {
    let harness = DeliveryHarness::builder()
        .targets([HEALTHY, RECOVERING])
        .sender(ScriptedSender::new().with_latency(Duration::from_millis(50)))
        .build();

    let handle = harness.dispatcher.broadcast(Event::new("user-1", "hello"));

    assert!(!handle.is_finished());
    assert!(harness.sender.calls().is_empty());

    let outcomes = handle.wait().await;
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_delivered()));
}

#[tokio::test(start_paused = true)]
async fn slow_target_does_not_delay_others() {
    let slow = DeliveryTarget::new(RECOVERING);
    let fast = DeliveryTarget::new(HEALTHY);
    let harness = DeliveryHarness::builder()
        .targets([RECOVERING, HEALTHY])
        .sender(ScriptedSender::new().script(RECOVERING, [Reply::timeout()]))
        .build();
    let start = Instant::now();

    let handle = harness.dispatcher.broadcast(Event::new("user-1", "hello"));
    let outcomes: HashMap<_, _> = handle.wait().await.into_iter().collect();

    assert!(outcomes[&fast].is_delivered());
    assert_eq!(outcomes[&slow].attempts(), 4);
    assert_eq!(harness.sender.calls_to(&fast).len(), 1);
    assert_eq!(harness.sender.calls_to(&fast)[0].at, start);
    assert_eq!(harness.store.records_for(&slow).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_queues_excess_deliveries() {
    let targets: Vec<String> = (0..10).map(|i| format!("http://localhost:{}", 9000 + i)).collect();
    let harness = DeliveryHarness::builder()
        .targets(targets.iter().map(String::as_str))
        .sender(ScriptedSender::new().with_latency(Duration::from_millis(100)))
        .max_concurrent_deliveries(2)
        .build();
    let start = Instant::now();

    let outcomes = harness.dispatcher.broadcast(Event::new("user-1", "hello")).wait().await;

    assert_eq!(outcomes.len(), 10);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_delivered()));
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_millis(600));
    assert_eq!(harness.dispatcher.available_permits(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_registry_dispatches_nothing() {
    let harness = DeliveryHarness::builder().build();

    let handle = harness.dispatcher.broadcast(Event::new("user-1", "hello"));

    assert!(handle.is_empty());
    assert!(handle.wait().await.is_empty());
    assert!(harness.sender.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stats_count_outcomes_across_broadcasts() {
    let harness = DeliveryHarness::builder()
        .targets([HEALTHY, REJECTING])
        .sender(ScriptedSender::new().script(REJECTING, [400u16]))
        .build();

    harness.dispatcher.broadcast(Event::new("user-1", "one")).wait().await;
    harness.dispatcher.broadcast(Event::new("user-1", "two")).wait().await;

    let stats = harness.dispatcher.stats();
    assert_eq!(
        stats,
        DispatchStats {
            broadcasts: 2,
            deliveries_started: 4,
            delivered: 2,
            failed: 2,
            emergency_captures: 0,
            in_flight: 0,
            pending: stats.pending,
        }
    );
    assert_eq!(harness.store.records().await.len(), 2);
}

//! Concurrent fan-out of one event to every registered target.
//!
//! [`FanOutDispatcher::broadcast`] snapshots the registry, spawns one tokio
//! task per target and returns immediately. Each task waits for a permit from
//! the shared limiter before delivering, so a large target list queues instead
//! of dropping work. Tasks are independent: a slow or failing target never
//! delays or cancels another.
//!
//! Every spawned delivery counts as pending until its task ends, whether it
//! is queued on the limiter, sending, or waiting between retries.
//! [`FanOutDispatcher::drain`] waits for that count to reach zero.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use relaycast_core::{DeliveryTarget, Event, EventId};
use tokio::{
    sync::{Notify, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, error, info_span, warn, Instrument};

use crate::{
    executor::{DeliveryExecutor, DeliveryOutcome},
    failure::CaptureOutcome,
    registry::TargetRegistry,
};

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of deliveries running at once across all broadcasts.
    pub max_concurrent_deliveries: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent_deliveries: crate::DEFAULT_MAX_CONCURRENT_DELIVERIES }
    }
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Broadcasts started.
    pub broadcasts: u64,
    /// Per-target deliveries spawned.
    pub deliveries_started: u64,
    /// Deliveries the target accepted.
    pub delivered: u64,
    /// Deliveries abandoned and captured.
    pub failed: u64,
    /// Abandoned deliveries that only reached the emergency sink.
    pub emergency_captures: u64,
    /// Deliveries currently holding a permit.
    pub in_flight: u64,
    /// Deliveries spawned and not yet finished, queued ones included.
    pub pending: u64,
}

#[derive(Debug, Default)]
struct Counters {
    broadcasts: AtomicU64,
    deliveries_started: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    emergency_captures: AtomicU64,
    in_flight: AtomicU64,
    pending: AtomicU64,
    idle: Notify,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries_started: self.deliveries_started.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            emergency_captures: self.emergency_captures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Acquire),
        }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered { .. } => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            },
            DeliveryOutcome::Failed { capture, .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if *capture == CaptureOutcome::Emergency {
                    self.emergency_captures.fetch_add(1, Ordering::Relaxed);
                }
            },
        }
    }
}

/// Holds one unit of the pending count for the life of a delivery task.
struct PendingGuard(Arc<Counters>);

impl PendingGuard {
    fn acquire(counters: Arc<Counters>) -> Self {
        counters.pending.fetch_add(1, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Starts one independent delivery per registered target.
#[derive(Debug, Clone)]
pub struct FanOutDispatcher {
    registry: Arc<dyn TargetRegistry>,
    executor: Arc<DeliveryExecutor>,
    limiter: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl FanOutDispatcher {
    /// Creates a dispatcher with its own limiter sized from `config`.
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        executor: DeliveryExecutor,
        config: &DispatcherConfig,
    ) -> Self {
        let permits = config.max_concurrent_deliveries.max(1);
        Self::with_limiter(registry, executor, Arc::new(Semaphore::new(permits)))
    }

    /// Creates a dispatcher sharing an existing limiter.
    pub fn with_limiter(
        registry: Arc<dyn TargetRegistry>,
        executor: DeliveryExecutor,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            registry,
            executor: Arc::new(executor),
            limiter,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sends `event` to every current target.
    ///
    /// Returns as soon as every per-target task has been spawned; no outcome
    /// is known yet. Must be called from within a tokio runtime. Dropping the
    /// returned handle detaches the deliveries, it does not cancel them.
    pub fn broadcast(&self, event: Event) -> BroadcastHandle {
        let targets = self.registry.current_targets();
        let event = Arc::new(event);
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);

        if targets.is_empty() {
            warn!(event_id = %event.id, "no delivery targets registered, event dropped");
            return BroadcastHandle { event_id: event.id, deliveries: Vec::new() };
        }

        debug!(event_id = %event.id, targets = targets.len(), "broadcasting event");

        let deliveries = targets
            .into_iter()
            .map(|target| {
                let handle = self.spawn_delivery(target.clone(), event.clone());
                (target, handle)
            })
            .collect();

        BroadcastHandle { event_id: event.id, deliveries }
    }

    fn spawn_delivery(
        &self,
        target: DeliveryTarget,
        event: Arc<Event>,
    ) -> JoinHandle<DeliveryOutcome> {
        let executor = self.executor.clone();
        let limiter = self.limiter.clone();
        let counters = self.counters.clone();
        let span = info_span!("fan_out", target_url = %target, event_id = %event.id);

        counters.deliveries_started.fetch_add(1, Ordering::Relaxed);
        let pending = PendingGuard::acquire(counters.clone());

        tokio::spawn(
            async move {
                let _pending = pending;
                // The limiter is never closed; a closed one degrades to unlimited.
                let _permit = limiter.acquire_owned().await.ok();
                counters.in_flight.fetch_add(1, Ordering::Relaxed);

                let outcome = executor.deliver(&target, &event).await;

                counters.in_flight.fetch_sub(1, Ordering::Relaxed);
                counters.record(&outcome);
                outcome
            }
            .instrument(span),
        )
    }

    /// Current counter values.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Waits up to `grace` for every pending delivery to finish.
    ///
    /// Returns the number of deliveries still pending when the grace period
    /// ran out; 0 means everything settled.
    pub async fn drain(&self, grace: Duration) -> u64 {
        let settled = async {
            loop {
                let idle = self.counters.idle.notified();
                tokio::pin!(idle);
                idle.as_mut().enable();

                if self.counters.pending.load(Ordering::Acquire) == 0 {
                    return;
                }
                idle.await;
            }
        };

        let pending = match tokio::time::timeout(grace, settled).await {
            Ok(()) => 0,
            Err(_) => self.counters.pending.load(Ordering::Acquire),
        };
        debug!(pending, "dispatcher drained");
        pending
    }

    /// Permits currently available on the limiter.
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }
}

/// Completion signal for one broadcast.
///
/// Production callers drop it. Tests await [`BroadcastHandle::wait`] to
/// observe every per-target outcome.
#[derive(Debug)]
pub struct BroadcastHandle {
    event_id: EventId,
    deliveries: Vec<(DeliveryTarget, JoinHandle<DeliveryOutcome>)>,
}

impl BroadcastHandle {
    /// Id of the broadcast event.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Number of deliveries started.
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Whether no delivery was started.
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Targets the event was dispatched to.
    pub fn targets(&self) -> impl Iterator<Item = &DeliveryTarget> {
        self.deliveries.iter().map(|(target, _)| target)
    }

    /// Whether every delivery has reached an outcome.
    pub fn is_finished(&self) -> bool {
        self.deliveries.iter().all(|(_, handle)| handle.is_finished())
    }

    /// Waits for every delivery and returns the outcomes in dispatch order.
    ///
    /// A delivery task that panicked is logged and left out; the remaining
    /// outcomes are still returned.
    pub async fn wait(self) -> Vec<(DeliveryTarget, DeliveryOutcome)> {
        let event_id = self.event_id;
        let (targets, handles): (Vec<_>, Vec<_>) = self.deliveries.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        targets
            .into_iter()
            .zip(results)
            .filter_map(|(target, result)| match result {
                Ok(outcome) => Some((target, outcome)),
                Err(e) => {
                    error!(
                        target_url = %target,
                        event_id = %event_id,
                        error = %e,
                        "delivery task did not complete"
                    );
                    None
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relaycast_core::RealClock;

    use super::*;
    use crate::{
        classify::FailureDescriptor,
        client::{RequestSender, SendResponse},
        failure::{TerminalFailureHandler, TracingEmergencySink},
        registry::StaticTargetRegistry,
        retry::RetryPolicy,
        storage::mock::MockFailureStore,
    };

    /// Answers 200 after a fixed latency, 404 for targets ending in "/bad".
    #[derive(Debug)]
    struct LatencySender {
        latency: Duration,
    }

    #[async_trait::async_trait]
    impl RequestSender for LatencySender {
        async fn send(
            &self,
            target: &DeliveryTarget,
            _event: &Event,
            _attempt: u32,
        ) -> Result<SendResponse, FailureDescriptor> {
            tokio::time::sleep(self.latency).await;
            if target.as_str().ends_with("/bad") {
                Err(FailureDescriptor::status(404))
            } else {
                Ok(SendResponse { status: 200, duration: self.latency })
            }
        }
    }

    fn dispatcher(targets: &[&str], permits: usize, store: &MockFailureStore) -> FanOutDispatcher {
        let clock = Arc::new(RealClock::new());
        let handler = TerminalFailureHandler::new(
            Arc::new(store.clone()),
            Arc::new(TracingEmergencySink),
            clock.clone(),
        );
        let executor = DeliveryExecutor::new(
            Arc::new(LatencySender { latency: Duration::from_millis(100) }),
            handler,
            RetryPolicy::default(),
            clock,
        );
        FanOutDispatcher::new(
            Arc::new(StaticTargetRegistry::new(targets.iter().copied())),
            executor,
            &DispatcherConfig { max_concurrent_deliveries: permits },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_returns_before_outcomes_are_known() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://c"], 8, &store);

        let handle = dispatcher.broadcast(Event::new("u", "m"));

        assert_eq!(handle.len(), 3);
        assert!(!handle.is_finished());

        let outcomes = handle.wait().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, outcome)| outcome.is_delivered()));
    }

    #[tokio::test(start_paused = true)]
    async fn targets_run_concurrently() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://c", "http://d"], 8, &store);
        let start = tokio::time::Instant::now();

        dispatcher.broadcast(Event::new("u", "m")).wait().await;

        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn single_permit_queues_instead_of_dropping() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://c"], 1, &store);
        let start = tokio::time::Instant::now();

        let outcomes = dispatcher.broadcast(Event::new("u", "m")).wait().await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, outcome)| outcome.is_delivered()));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(dispatcher.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_track_outcomes() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://x/bad"], 8, &store);

        dispatcher.broadcast(Event::new("u", "m")).wait().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.broadcasts, 1);
        assert_eq!(stats.deliveries_started, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.emergency_captures, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_deliveries_count_as_pending() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://c"], 1, &store);

        let _handle = dispatcher.broadcast(Event::new("u", "m"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = dispatcher.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.pending, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_queued_deliveries() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://x/bad"], 1, &store);
        let start = tokio::time::Instant::now();

        drop(dispatcher.broadcast(Event::new("u", "m")));
        let remaining = dispatcher.drain(Duration::from_secs(5)).await;

        assert_eq!(remaining, 0);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        let stats = dispatcher.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_reports_deliveries_left_after_grace() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://b", "http://c"], 1, &store);

        drop(dispatcher.broadcast(Event::new("u", "m")));
        let remaining = dispatcher.drain(Duration::from_millis(150)).await;

        assert_eq!(remaining, 2);
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[tokio::test]
    async fn drain_returns_at_once_when_idle() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a"], 1, &store);

        assert_eq!(dispatcher.drain(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_handle() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&[], 8, &store);

        let handle = dispatcher.broadcast(Event::new("u", "m"));

        assert!(handle.is_empty());
        assert!(handle.wait().await.is_empty());
        assert_eq!(dispatcher.stats().broadcasts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_cancel_deliveries() {
        let store = MockFailureStore::new();
        let dispatcher = dispatcher(&["http://a", "http://x/bad"], 8, &store);

        drop(dispatcher.broadcast(Event::new("u", "m")));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(dispatcher.stats().delivered, 1);
        assert_eq!(store.records().await.len(), 1);
    }
}

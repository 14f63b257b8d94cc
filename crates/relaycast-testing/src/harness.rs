//! Pre-wired delivery and consumption stacks built from the test doubles.
//!
//! Both harnesses default to [`RealClock`], so delays run on tokio time and
//! tests using `start_paused = true` observe exact wall-time gaps without
//! waiting.

use std::sync::Arc;

use relaycast_consumer::{ConsumePolicy, ConsumptionLayer};
use relaycast_core::{Clock, DeliveryTarget, RealClock};
use relaycast_delivery::{
    storage::mock::MockFailureStore, DeliveryExecutor, DispatcherConfig, FanOutDispatcher,
    RetryPolicy, StaticTargetRegistry, TerminalFailureHandler,
};

use crate::{
    consumer::{RecordingDeadLetterPublisher, ScriptedProcessor},
    sender::ScriptedSender,
    sinks::RecordingEmergencySink,
};

/// Dispatcher wired to a scripted sender, in-memory store and recording sink.
#[derive(Debug, Clone)]
pub struct DeliveryHarness {
    /// Sender answering every request.
    pub sender: ScriptedSender,
    /// Store receiving failure records.
    pub store: MockFailureStore,
    /// Sink receiving failures the store rejected.
    pub emergency: RecordingEmergencySink,
    /// Executor shared by the dispatcher.
    pub executor: DeliveryExecutor,
    /// Dispatcher over the configured targets.
    pub dispatcher: FanOutDispatcher,
}

impl DeliveryHarness {
    /// Starts a builder with default policy and no targets.
    pub fn builder() -> DeliveryHarnessBuilder {
        DeliveryHarnessBuilder::default()
    }
}

/// Builder for [`DeliveryHarness`].
#[derive(Debug, Default)]
pub struct DeliveryHarnessBuilder {
    targets: Vec<DeliveryTarget>,
    sender: Option<ScriptedSender>,
    store: Option<MockFailureStore>,
    policy: RetryPolicy,
    dispatcher: DispatcherConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl DeliveryHarnessBuilder {
    /// Adds one target.
    #[must_use]
    pub fn target(mut self, target: impl Into<DeliveryTarget>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Adds several targets.
    #[must_use]
    pub fn targets(mut self, targets: impl IntoIterator<Item = impl Into<DeliveryTarget>>) -> Self {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Uses `sender` instead of an all-200 sender.
    #[must_use]
    pub fn sender(mut self, sender: ScriptedSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Uses `store` instead of a healthy empty store.
    #[must_use]
    pub fn store(mut self, store: MockFailureStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn max_concurrent_deliveries(mut self, limit: usize) -> Self {
        self.dispatcher.max_concurrent_deliveries = limit;
        self
    }

    /// Uses `clock` instead of the real clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wires everything together.
    pub fn build(self) -> DeliveryHarness {
        let sender = self.sender.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let emergency = RecordingEmergencySink::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(RealClock::new()));

        let handler = TerminalFailureHandler::new(
            Arc::new(store.clone()),
            Arc::new(emergency.clone()),
            clock.clone(),
        );
        let executor =
            DeliveryExecutor::new(Arc::new(sender.clone()), handler, self.policy, clock);
        let dispatcher = FanOutDispatcher::new(
            Arc::new(StaticTargetRegistry::new(self.targets)),
            executor.clone(),
            &self.dispatcher,
        );

        DeliveryHarness { sender, store, emergency, executor, dispatcher }
    }
}

/// Consumption layer wired to a scripted processor and recording publisher.
#[derive(Debug, Clone)]
pub struct ConsumerHarness {
    /// Processor invoked per record.
    pub processor: ScriptedProcessor,
    /// Publisher receiving dead-lettered records.
    pub dead_letters: RecordingDeadLetterPublisher,
    /// Layer under test.
    pub layer: ConsumptionLayer,
}

impl ConsumerHarness {
    /// Wires `processor` with the default policy and the real clock.
    pub fn new(processor: ScriptedProcessor) -> Self {
        Self::with_policy(processor, ConsumePolicy::default(), Arc::new(RealClock::new()))
    }

    /// Wires `processor` with an explicit policy and clock.
    pub fn with_policy(
        processor: ScriptedProcessor,
        policy: ConsumePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dead_letters = RecordingDeadLetterPublisher::new();
        let layer = ConsumptionLayer::new(
            Arc::new(processor.clone()),
            Arc::new(dead_letters.clone()),
            policy,
            clock,
        );

        Self { processor, dead_letters, layer }
    }
}

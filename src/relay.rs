//! Application wiring.
//!
//! [`RelayBuilder`] turns a [`Config`] plus the external collaborators into a
//! consumption layer whose processor broadcasts every event. Collaborators
//! that have a sensible default (HTTP sender, static registry, tracing
//! emergency sink, real clock) can be left out; the failure store and the
//! dead-letter publisher must be supplied.

use std::sync::Arc;

use anyhow::{Context, Result};
use relaycast_consumer::{
    ConsumeStats, ConsumptionLayer, DeadLetterPublisher, EventProcessor, RecordSource,
};
use relaycast_core::{Clock, RealClock};
use relaycast_delivery::{
    DeliveryExecutor, EmergencySink, FailureStore, FanOutDispatcher, HttpSender, RequestSender,
    StaticTargetRegistry, TargetRegistry, TerminalFailureHandler, TracingEmergencySink,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{config::Config, processor::BroadcastProcessor};

/// Consume-then-broadcast pipeline.
#[derive(Debug, Clone)]
pub struct Relay {
    dispatcher: FanOutDispatcher,
    layer: ConsumptionLayer,
}

impl Relay {
    /// Starts a builder for `config`.
    pub fn builder(config: Config) -> RelayBuilder {
        RelayBuilder::new(config)
    }

    /// Dispatcher every consumed event is broadcast through.
    pub fn dispatcher(&self) -> &FanOutDispatcher {
        &self.dispatcher
    }

    /// Consumption layer driving the pipeline.
    pub fn layer(&self) -> &ConsumptionLayer {
        &self.layer
    }

    /// Consumes `source` until it ends or `shutdown` fires.
    pub async fn run<S>(&self, source: &mut S, shutdown: CancellationToken) -> ConsumeStats
    where
        S: RecordSource + ?Sized,
    {
        self.layer.run(source, shutdown).await
    }
}

/// Builder for [`Relay`].
#[derive(Debug)]
pub struct RelayBuilder {
    config: Config,
    sender: Option<Arc<dyn RequestSender>>,
    registry: Option<Arc<dyn TargetRegistry>>,
    store: Option<Arc<dyn FailureStore>>,
    emergency: Option<Arc<dyn EmergencySink>>,
    dead_letters: Option<Arc<dyn DeadLetterPublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RelayBuilder {
    /// Creates a builder with no collaborators set.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sender: None,
            registry: None,
            store: None,
            emergency: None,
            dead_letters: None,
            clock: None,
        }
    }

    /// Overrides the HTTP sender.
    #[must_use]
    pub fn sender(mut self, sender: Arc<dyn RequestSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Overrides the registry built from `config.targets`.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn TargetRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the durable failure store.
    #[must_use]
    pub fn failure_store(mut self, store: Arc<dyn FailureStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the tracing emergency sink.
    #[must_use]
    pub fn emergency_sink(mut self, sink: Arc<dyn EmergencySink>) -> Self {
        self.emergency = Some(sink);
        self
    }

    /// Sets the dead-letter publisher.
    #[must_use]
    pub fn dead_letter_publisher(mut self, publisher: Arc<dyn DeadLetterPublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    /// Overrides the real clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wires the pipeline.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the failure store or
    /// dead-letter publisher is missing, or the HTTP client cannot be built.
    pub fn build(self) -> Result<Relay> {
        self.config.validate()?;

        let store = self.store.context("a failure store is required")?;
        let dead_letters = self.dead_letters.context("a dead-letter publisher is required")?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(RealClock::new()));
        let emergency = self.emergency.unwrap_or_else(|| Arc::new(TracingEmergencySink));

        let sender = match self.sender {
            Some(sender) => sender,
            None => Arc::new(
                HttpSender::new(self.config.to_client_config())
                    .context("failed to build HTTP sender")?,
            ),
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(StaticTargetRegistry::new(self.config.targets.clone())));

        let handler = TerminalFailureHandler::new(store, emergency, clock.clone());
        let executor =
            DeliveryExecutor::new(sender, handler, self.config.to_retry_policy(), clock.clone());
        let dispatcher =
            FanOutDispatcher::new(registry, executor, &self.config.to_dispatcher_config());

        let processor: Arc<dyn EventProcessor> =
            Arc::new(BroadcastProcessor::new(dispatcher.clone()));
        let layer = ConsumptionLayer::new(
            processor,
            dead_letters,
            self.config.to_consume_policy(),
            clock,
        );

        info!(
            targets = self.config.targets.len(),
            delivery_max_attempts = self.config.delivery_max_attempts,
            consume_max_attempts = self.config.consume_max_attempts,
            "relay wired"
        );

        Ok(Relay { dispatcher, layer })
    }
}

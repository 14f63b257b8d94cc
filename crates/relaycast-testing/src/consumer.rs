//! Doubles for the consumption side: dead-letter publisher and processor.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use relaycast_consumer::{
    ConsumerError, DeadLetterEnvelope, DeadLetterPublisher, EventProcessor, ProcessorError,
};
use relaycast_core::{Event, EventId};
use tokio::time::Instant;

/// Dead-letter publisher that records envelopes and can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingDeadLetterPublisher {
    published: Arc<Mutex<Vec<DeadLetterEnvelope>>>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
}

impl RecordingDeadLetterPublisher {
    /// Creates a healthy publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail until [`recover`](Self::recover) is called.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Restores successful publishing.
    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Envelopes accepted so far.
    pub fn published(&self) -> Vec<DeadLetterEnvelope> {
        self.published.lock().map(|published| published.clone()).unwrap_or_default()
    }

    /// Publish calls, accepted or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeadLetterPublisher for RecordingDeadLetterPublisher {
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> relaycast_consumer::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ConsumerError::dead_letter(
                &envelope.channel,
                envelope.partition,
                "broker unavailable",
            ));
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(envelope.clone());
        }
        Ok(())
    }
}

/// How a [`ScriptedProcessor`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorScript {
    /// Always succeeds.
    Succeed,
    /// Fails the first `n` calls, then succeeds.
    FailTimes(u32),
    /// Always fails.
    AlwaysFail,
}

/// Processor following a fixed script and recording each call.
#[derive(Debug, Clone)]
pub struct ScriptedProcessor {
    script: ProcessorScript,
    calls: Arc<Mutex<Vec<(EventId, Instant)>>>,
}

impl ScriptedProcessor {
    /// Creates a processor following `script`.
    pub fn new(script: ProcessorScript) -> Self {
        Self { script, calls: Arc::default() }
    }

    /// Always succeeds.
    pub fn succeeding() -> Self {
        Self::new(ProcessorScript::Succeed)
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self::new(ProcessorScript::AlwaysFail)
    }

    /// Ids of processed events with the tokio time of each call.
    pub fn calls(&self) -> Vec<(EventId, Instant)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait::async_trait]
impl EventProcessor for ScriptedProcessor {
    async fn process(&self, event: &Event) -> Result<(), ProcessorError> {
        let call = match self.calls.lock() {
            Ok(mut calls) => {
                calls.push((event.id, Instant::now()));
                calls.len()
            },
            Err(_) => return Err(ProcessorError::new("processor state poisoned")),
        };

        let fails = match self.script {
            ProcessorScript::Succeed => false,
            ProcessorScript::FailTimes(n) => call <= n as usize,
            ProcessorScript::AlwaysFail => true,
        };

        if fails {
            Err(ProcessorError::new(format!("scripted failure on call {call}")))
        } else {
            Ok(())
        }
    }
}

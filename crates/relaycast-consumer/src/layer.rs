//! Consumption reliability layer.
//!
//! Records of one partition are handled strictly one at a time, in arrival
//! order. A failing processor is retried with a fixed delay; once the attempt
//! budget is spent the untouched record is forwarded to the dead-letter
//! channel and the position is committed past it, so a poisoned record never
//! stalls the partition.
//!
//! The position is only committed once the record is settled: processed, or
//! accepted by the dead-letter channel. A failed dead-letter publish leaves
//! the record uncommitted and only the publish is retried.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use relaycast_core::{Clock, Event};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    dead_letter::{DeadLetterEnvelope, DeadLetterPublisher, DEFAULT_DEAD_LETTER_SUFFIX},
    error::Result,
    processor::EventProcessor,
    record::StreamRecord,
    source::RecordSource,
};

/// Retry and dead-letter settings for consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumePolicy {
    /// Processing attempts per record before dead-lettering.
    pub max_attempts: u32,
    /// Fixed delay between attempts, also used before re-handling a record
    /// whose dead-letter publish failed.
    pub delay: Duration,
    /// Suffix forming the dead-letter channel name.
    pub dead_letter_suffix: String,
}

impl Default for ConsumePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            dead_letter_suffix: DEFAULT_DEAD_LETTER_SUFFIX.to_string(),
        }
    }
}

/// How one record was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The processor accepted the event.
    Processed {
        /// Attempts used, starting at 1
        attempts: u32,
    },
    /// The record was forwarded to the dead-letter channel.
    DeadLettered {
        /// Processing attempts made; 0 for an undecodable payload
        attempts: u32,
        /// Final failure cause
        cause: String,
    },
}

impl ConsumeOutcome {
    /// Processing attempts made for the record.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Processed { attempts } | Self::DeadLettered { attempts, .. } => *attempts,
        }
    }
}

/// Snapshot of consumption counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    /// Records the processor accepted.
    pub processed: u64,
    /// Records forwarded to the dead-letter channel.
    pub dead_lettered: u64,
    /// Dead-lettered records whose payload could not be decoded.
    pub undecodable: u64,
    /// Dead-letter publishes that failed.
    pub dead_letter_failures: u64,
    /// Positions committed.
    pub committed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    dead_lettered: AtomicU64,
    undecodable: AtomicU64,
    dead_letter_failures: AtomicU64,
    committed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumeStats {
        ConsumeStats {
            processed: self.processed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
        }
    }
}

/// Processing result, before the dead-letter channel is involved.
enum Verdict {
    Processed { attempts: u32 },
    Rejected { envelope: DeadLetterEnvelope, attempts: u32 },
}

fn record_span(record: &StreamRecord) -> tracing::Span {
    info_span!(
        "consume",
        channel = %record.channel,
        partition = record.partition,
        offset = record.offset
    )
}

/// Sequential per-partition consumer with bounded retries and dead-lettering.
///
/// Cloning is cheap and clones share counters, so one [`run`](Self::run) per
/// partition source can be spawned side by side.
#[derive(Debug, Clone)]
pub struct ConsumptionLayer {
    processor: Arc<dyn EventProcessor>,
    publisher: Arc<dyn DeadLetterPublisher>,
    policy: Arc<ConsumePolicy>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
}

impl ConsumptionLayer {
    /// Creates a layer over the given processor and dead-letter publisher.
    pub fn new(
        processor: Arc<dyn EventProcessor>,
        publisher: Arc<dyn DeadLetterPublisher>,
        policy: ConsumePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            processor,
            publisher,
            policy: Arc::new(policy),
            clock,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> &ConsumePolicy {
        &self.policy
    }

    /// Current counter values.
    pub fn stats(&self) -> ConsumeStats {
        self.counters.snapshot()
    }

    /// Settles one record without committing it.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::DeadLetterError` if the record had to be
    /// dead-lettered and the publish failed. The caller must not commit it.
    pub async fn handle(&self, record: &StreamRecord) -> Result<ConsumeOutcome> {
        async move {
            let verdict = self.evaluate(record).await;
            self.conclude(record, &verdict).await
        }
        .instrument(record_span(record))
        .await
    }

    /// Runs the processor retry loop. Never touches the dead-letter channel.
    async fn evaluate(&self, record: &StreamRecord) -> Verdict {
        let decoded = match &record.payload {
            Some(payload) => {
                Event::from_json(payload).map_err(|e| format!("undecodable payload: {e}"))
            },
            None => Err("record has no payload".to_string()),
        };
        let event = match decoded {
            Ok(event) => event,
            Err(cause) => {
                warn!(cause = %cause, "record cannot be decoded, skipping retries");
                self.counters.undecodable.fetch_add(1, Ordering::Relaxed);
                return self.reject(record, 0, cause);
            },
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.processor.process(&event).await {
                Ok(()) => {
                    debug!(event_id = %event.id, attempts = attempt, "event processed");
                    self.counters.processed.fetch_add(1, Ordering::Relaxed);
                    return Verdict::Processed { attempts: attempt };
                },
                Err(e) if attempt < max_attempts => {
                    warn!(
                        event_id = %event.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "processing failed, retrying"
                    );
                    self.clock.sleep(self.policy.delay).await;
                },
                Err(e) => return self.reject(record, attempt, e.to_string()),
            }
        }
    }

    fn reject(&self, record: &StreamRecord, attempts: u32, cause: String) -> Verdict {
        let envelope =
            DeadLetterEnvelope::for_record(record, &self.policy.dead_letter_suffix, cause);
        Verdict::Rejected { envelope, attempts }
    }

    /// Publishes a rejected record. Safe to call again after a failed publish.
    async fn conclude(&self, record: &StreamRecord, verdict: &Verdict) -> Result<ConsumeOutcome> {
        let (envelope, attempts) = match verdict {
            Verdict::Processed { attempts } => {
                return Ok(ConsumeOutcome::Processed { attempts: *attempts });
            },
            Verdict::Rejected { envelope, attempts } => (envelope, *attempts),
        };

        if let Err(e) = self.publisher.publish(envelope).await {
            self.counters.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        error!(
            channel = %record.channel,
            partition = record.partition,
            offset = record.offset,
            dead_letter_channel = %envelope.channel,
            attempts,
            cause = %envelope.cause,
            "record redirected to dead-letter channel"
        );
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);

        Ok(ConsumeOutcome::DeadLettered { attempts, cause: envelope.cause.clone() })
    }

    /// Consumes `source` until it ends or `shutdown` fires.
    ///
    /// Each record is settled and then committed before the next one is read.
    /// Shutdown is only observed between records and while waiting to retry a
    /// failed dead-letter publish; a record being processed is finished first.
    pub async fn run<S>(&self, source: &mut S, shutdown: CancellationToken) -> ConsumeStats
    where
        S: RecordSource + ?Sized,
    {
        info!("consumer started");

        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = source.next() => next,
            };

            let record = match next {
                Ok(Some(record)) => record,
                Ok(None) => {
                    info!("record source exhausted");
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "failed to read next record");
                    if self.pause(&shutdown).await {
                        break;
                    }
                    continue;
                },
            };

            if !self.settle(source, &record, &shutdown).await {
                break;
            }
        }

        let stats = self.stats();
        info!(
            processed = stats.processed,
            dead_lettered = stats.dead_lettered,
            committed = stats.committed,
            "consumer stopped"
        );
        stats
    }

    /// Handles and commits one record. A failed dead-letter publish is
    /// retried on its own, without running the processor again. Returns
    /// `false` if shutdown interrupted those retries, leaving the record
    /// uncommitted.
    async fn settle<S>(
        &self,
        source: &mut S,
        record: &StreamRecord,
        shutdown: &CancellationToken,
    ) -> bool
    where
        S: RecordSource + ?Sized,
    {
        async move {
            let verdict = self.evaluate(record).await;

            while let Err(e) = self.conclude(record, &verdict).await {
                error!(error = %e, "dead-letter publish failed, position left uncommitted");
                if self.pause(shutdown).await {
                    return false;
                }
            }

            match source.commit(record).await {
                Ok(()) => {
                    self.counters.committed.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => {
                    error!(error = %e, "failed to commit position");
                },
            }
            true
        }
        .instrument(record_span(record))
        .await
    }

    /// Waits the fixed delay. Returns `true` if shutdown fired first.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => true,
            () = self.clock.sleep(self.policy.delay) => false,
        }
    }
}

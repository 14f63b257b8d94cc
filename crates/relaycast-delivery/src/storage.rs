//! Durable store abstraction for failure records.
//!
//! The delivery path needs exactly one operation: append a record and learn
//! its id. Production appends through `relaycast_core::storage`; tests use
//! [`mock::MockFailureStore`].

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use relaycast_core::{error::Result, FailedDeliveryRecord};

/// Append-only persistence for abandoned deliveries.
pub trait FailureStore: Send + Sync + fmt::Debug + 'static {
    /// Appends a failure record and returns its store-assigned id.
    fn append(
        &self,
        record: FailedDeliveryRecord,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;
}

/// PostgreSQL-backed failure store.
#[derive(Clone)]
pub struct PostgresFailureStore {
    storage: Arc<relaycast_core::storage::Storage>,
}

impl PostgresFailureStore {
    /// Creates a new PostgreSQL failure store adapter.
    pub fn new(storage: Arc<relaycast_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl fmt::Debug for PostgresFailureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresFailureStore").finish_non_exhaustive()
    }
}

impl FailureStore for PostgresFailureStore {
    fn append(
        &self,
        record: FailedDeliveryRecord,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.failed_deliveries.append(&record).await })
    }
}

/// In-memory failure store for tests.
pub mod mock {
    use std::sync::atomic::{AtomicI64, Ordering};

    use relaycast_core::{CoreError, DeliveryTarget};
    use tokio::sync::RwLock;

    use super::*;

    /// Records every appended failure in memory.
    ///
    /// An injected error makes every subsequent append fail until cleared,
    /// which models a store that is down rather than a single hiccup.
    #[derive(Debug, Clone, Default)]
    pub struct MockFailureStore {
        records: Arc<RwLock<Vec<FailedDeliveryRecord>>>,
        outage: Arc<RwLock<Option<String>>>,
        attempted_appends: Arc<AtomicI64>,
        next_id: Arc<AtomicI64>,
    }

    impl MockFailureStore {
        /// Creates an empty, healthy store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a store that rejects every append with `message`.
        pub fn unavailable(message: impl Into<String>) -> Self {
            let mut store = Self::new();
            store.outage = Arc::new(RwLock::new(Some(message.into())));
            store
        }

        /// Starts failing every append with `message`.
        pub async fn fail_with(&self, message: impl Into<String>) {
            *self.outage.write().await = Some(message.into());
        }

        /// Restores normal operation.
        pub async fn recover(&self) {
            *self.outage.write().await = None;
        }

        /// Returns every stored record in append order.
        pub async fn records(&self) -> Vec<FailedDeliveryRecord> {
            self.records.read().await.clone()
        }

        /// Returns the stored records for one target.
        pub async fn records_for(&self, target: &DeliveryTarget) -> Vec<FailedDeliveryRecord> {
            self.records.read().await.iter().filter(|r| &r.target == target).cloned().collect()
        }

        /// Number of append calls, successful or not.
        pub fn append_calls(&self) -> i64 {
            self.attempted_appends.load(Ordering::SeqCst)
        }
    }

    impl FailureStore for MockFailureStore {
        fn append(
            &self,
            record: FailedDeliveryRecord,
        ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
            Box::pin(async move {
                self.attempted_appends.fetch_add(1, Ordering::SeqCst);

                if let Some(message) = self.outage.read().await.clone() {
                    return Err(CoreError::Database(message));
                }

                self.records.write().await.push(record);
                Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
            })
        }
    }
}

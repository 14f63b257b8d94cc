//! Database access for relaycast.
//!
//! Only failure records are persisted, and only ever appended.

use std::sync::Arc;

use sqlx::PgPool;

pub mod failed_deliveries;

use crate::error::Result;

/// Container for repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for abandoned delivery records.
    pub failed_deliveries: Arc<failed_deliveries::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { failed_deliveries: Arc::new(failed_deliveries::Repository::new(pool)) }
    }

    /// Creates every table the repositories need if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the DDL cannot be applied.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.failed_deliveries.ensure_schema().await
    }
}

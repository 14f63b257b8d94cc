//! Repository for abandoned delivery records.
//!
//! Rows are inserted once and never updated by the delivery path. Identity is
//! a `BIGSERIAL` and the payload is stored as `TEXT` so arbitrarily large
//! events fit.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{error::Result, models::FailedDeliveryRecord};

/// Repository for the `failed_deliveries` table.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates the `failed_deliveries` table and its index if missing.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS failed_deliveries (
                id BIGSERIAL PRIMARY KEY,
                target_url TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                error_reason TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                is_retried BOOLEAN NOT NULL DEFAULT FALSE
            )
            ",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_failed_deliveries_target
                ON failed_deliveries (target_url, created_at)
            ",
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Appends a failure record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn append(&self, record: &FailedDeliveryRecord) -> Result<i64> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO failed_deliveries (
                target_url, payload_json, error_reason, created_at, is_retried
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(record.target.as_str())
        .bind(&record.payload_json)
        .bind(&record.reason)
        .bind(record.created_at)
        .bind(record.remediated)
        .fetch_one(&*self.pool)
        .await?;

        Ok(id)
    }
}

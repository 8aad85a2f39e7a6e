//! Store decorator that retries transient failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BootRecord, CloseOutcome, MeterReading, Store, Transaction};
use crate::support::errors::{StoreError, StoreResult};
use crate::support::retry::{retry_with_backoff, RetryConfig};

/// Wraps any [`Store`] and retries its transient errors with exponential backoff.
///
/// A `NotFound` close is an answer, not an error, so it is never retried.
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: Store> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn transient(err: &StoreError) -> bool {
    err.is_transient()
}

#[async_trait]
impl<S: Store> Store for RetryingStore<S> {
    async fn record_boot(&self, boot: BootRecord) -> StoreResult<()> {
        retry_with_backoff(
            &self.config,
            || self.inner.record_boot(boot.clone()),
            transient,
            "record_boot",
        )
        .await
    }

    async fn record_meter_values(&self, reading: MeterReading) -> StoreResult<()> {
        retry_with_backoff(
            &self.config,
            || self.inner.record_meter_values(reading.clone()),
            transient,
            "record_meter_values",
        )
        .await
    }

    async fn open_transaction(&self, transaction: Transaction) -> StoreResult<i32> {
        retry_with_backoff(
            &self.config,
            || self.inner.open_transaction(transaction.clone()),
            transient,
            "open_transaction",
        )
        .await
    }

    async fn close_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        end_timestamp: DateTime<Utc>,
        reason: Option<String>,
    ) -> StoreResult<CloseOutcome> {
        retry_with_backoff(
            &self.config,
            || {
                self.inner
                    .close_transaction(transaction_id, meter_stop, end_timestamp, reason.clone())
            },
            transient,
            "close_transaction",
        )
        .await
    }

    async fn find_transaction(&self, transaction_id: i32) -> StoreResult<Option<Transaction>> {
        retry_with_backoff(
            &self.config,
            || self.inner.find_transaction(transaction_id),
            transient,
            "find_transaction",
        )
        .await
    }

    async fn last_transaction_id(&self) -> StoreResult<Option<i32>> {
        retry_with_backoff(
            &self.config,
            || self.inner.last_transaction_id(),
            transient,
            "last_transaction_id",
        )
        .await
    }
}

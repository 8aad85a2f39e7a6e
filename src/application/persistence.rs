//! Bounded-wait submission of Store writes.
//!
//! Every write runs in its own task. The caller waits at most
//! `ack_timeout` for it; a slower write keeps running in the background and
//! its handle is returned so a dependent write can be chained after it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::domain::{BootRecord, CloseOutcome, MeterReading, Store, Transaction};
use crate::support::errors::{StoreError, StoreResult};

/// Handle of a Store write that has not been acknowledged yet.
pub type PendingWrite<T> = JoinHandle<StoreResult<T>>;

/// What the caller knows about a write once its wait is over.
#[derive(Debug)]
pub enum WriteAck<T> {
    Done(T),
    Failed(StoreError),
    /// Still running after the acknowledgement timeout.
    InFlight(PendingWrite<T>),
}

#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn Store>,
    ack_timeout: Duration,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn Store>, ack_timeout: Duration) -> Self {
        Self { store, ack_timeout }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn submit<T, F>(&self, operation: &'static str, write: F) -> WriteAck<T>
    where
        T: Send + 'static,
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let mut handle = tokio::spawn(write);
        match timeout(self.ack_timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => WriteAck::Done(value),
            Ok(Ok(Err(e))) => {
                error!(operation, error = %e, "Store write failed");
                WriteAck::Failed(e)
            }
            Ok(Err(join)) => {
                error!(operation, error = %join, "Store write task died");
                WriteAck::Failed(StoreError::Task(join.to_string()))
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.ack_timeout.as_millis() as u64,
                    "Store write not acknowledged in time, continuing in background"
                );
                WriteAck::InFlight(handle)
            }
        }
    }

    pub async fn record_boot(&self, boot: BootRecord) -> WriteAck<()> {
        let store = self.store.clone();
        self.submit("record_boot", async move { store.record_boot(boot).await })
            .await
    }

    pub async fn record_meter_values(&self, reading: MeterReading) -> WriteAck<()> {
        let store = self.store.clone();
        self.submit("record_meter_values", async move {
            store.record_meter_values(reading).await
        })
        .await
    }

    pub async fn open_transaction(&self, transaction: Transaction) -> WriteAck<i32> {
        let store = self.store.clone();
        self.submit("open_transaction", async move {
            store.open_transaction(transaction).await
        })
        .await
    }

    /// Close a transaction, first waiting for `after` (its open write) to finish.
    ///
    /// The close runs whatever the open write's result was; a failed open
    /// surfaces as `NotFound`.
    pub async fn close_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        end_timestamp: DateTime<Utc>,
        reason: Option<String>,
        after: Option<PendingWrite<i32>>,
    ) -> WriteAck<CloseOutcome> {
        let store = self.store.clone();
        self.submit("close_transaction", async move {
            if let Some(open_write) = after {
                match open_write.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(transaction_id, error = %e, "Open write failed before close"),
                    Err(e) => warn!(transaction_id, error = %e, "Open write task died before close"),
                }
            }
            store
                .close_transaction(transaction_id, meter_stop, end_timestamp, reason)
                .await
        })
        .await
    }

    /// Look a transaction up, bounded by the same timeout as writes.
    pub async fn find_transaction(&self, transaction_id: i32) -> StoreResult<Option<Transaction>> {
        match timeout(self.ack_timeout, self.store.find_transaction(transaction_id)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "lookup of transaction {} timed out",
                transaction_id
            ))),
        }
    }
}

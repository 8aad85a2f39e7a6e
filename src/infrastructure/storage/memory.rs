//! In-memory storage implementation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::domain::{BootRecord, CloseOutcome, MeterReading, Store, Transaction};
use crate::support::errors::{StoreError, StoreResult};

/// In-memory storage for development and testing.
///
/// Writes can be delayed or made to fail to exercise the dispatcher's
/// behaviour when the store is slow or down.
pub struct InMemoryStore {
    boots: Mutex<Vec<BootRecord>>,
    meter_readings: Mutex<Vec<MeterReading>>,
    transactions: DashMap<i32, Transaction>,
    write_count: AtomicU64,
    unavailable: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            boots: Mutex::new(Vec::new()),
            meter_readings: Mutex::new(Vec::new()),
            transactions: DashMap::new(),
            write_count: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            write_delay_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent write by `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn boots(&self) -> Vec<BootRecord> {
        lock(&self.boots).clone()
    }

    pub fn meter_readings(&self) -> Vec<MeterReading> {
        lock(&self.meter_readings).clone()
    }

    pub fn transaction(&self, transaction_id: i32) -> Option<Transaction> {
        self.transactions.get(&transaction_id).map(|t| t.clone())
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> = self.transactions.iter().map(|t| t.clone()).collect();
        all.sort_by_key(|t| t.transaction_id);
        all
    }

    /// Number of successful writes of any kind.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    async fn before_write(&self) -> StoreResult<()> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }

    fn after_write(&self) {
        self.write_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock only means another test thread panicked mid-push; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn record_boot(&self, boot: BootRecord) -> StoreResult<()> {
        self.before_write().await?;
        debug!(charge_point_id = boot.charge_point_id.as_str(), "Recording boot");
        lock(&self.boots).push(boot);
        self.after_write();
        Ok(())
    }

    async fn record_meter_values(&self, reading: MeterReading) -> StoreResult<()> {
        self.before_write().await?;
        lock(&self.meter_readings).push(reading);
        self.after_write();
        Ok(())
    }

    async fn open_transaction(&self, transaction: Transaction) -> StoreResult<i32> {
        self.before_write().await?;
        let id = transaction.transaction_id;
        self.transactions.insert(id, transaction);
        self.after_write();
        Ok(id)
    }

    async fn close_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        end_timestamp: DateTime<Utc>,
        reason: Option<String>,
    ) -> StoreResult<CloseOutcome> {
        self.before_write().await?;
        match self.transactions.get_mut(&transaction_id) {
            Some(mut tx) => {
                tx.close(meter_stop, end_timestamp, reason);
                self.after_write();
                Ok(CloseOutcome::Closed)
            }
            None => Ok(CloseOutcome::NotFound),
        }
    }

    async fn find_transaction(&self, transaction_id: i32) -> StoreResult<Option<Transaction>> {
        Ok(self.transaction(transaction_id))
    }

    async fn last_transaction_id(&self) -> StoreResult<Option<i32>> {
        Ok(self.transactions.iter().map(|t| *t.key()).max())
    }
}

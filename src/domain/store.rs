//! Persistence port
//!
//! The core hands validated events to a [`Store`]. Implementations must be
//! safe to call from many sessions at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transaction::Transaction;
use crate::support::errors::StoreResult;

/// A BootNotification accepted from a charge point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootRecord {
    pub charge_point_id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub booted_at: DateTime<Utc>,
}

/// One MeterValues message, as ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub received_at: DateTime<Utc>,
    /// The `meterValue` array exactly as the charge point sent it
    pub samples: Value,
    /// Last `Energy.Active.Import.Register` sample, in Wh
    pub energy_wh: Option<f64>,
}

/// Result of closing a transaction in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    NotFound,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn record_boot(&self, boot: BootRecord) -> StoreResult<()>;

    async fn record_meter_values(&self, reading: MeterReading) -> StoreResult<()>;

    /// Persist a freshly started transaction; returns its ID.
    async fn open_transaction(&self, transaction: Transaction) -> StoreResult<i32>;

    async fn close_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        end_timestamp: DateTime<Utc>,
        reason: Option<String>,
    ) -> StoreResult<CloseOutcome>;

    async fn find_transaction(&self, transaction_id: i32) -> StoreResult<Option<Transaction>>;

    /// Highest transaction ID ever persisted, used to seed the ID generator.
    async fn last_transaction_id(&self) -> StoreResult<Option<i32>>;
}

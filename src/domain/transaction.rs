//! Transaction domain entity

use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One charging session on a connector, bounded by Start/StopTransaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Server-assigned transaction ID
    pub transaction_id: i32,
    /// Charge point that started the transaction
    pub charge_point_id: String,
    /// Connector ID
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Start time as reported by the charge point
    pub start_timestamp: DateTime<Utc>,
    /// `false` once the matching StopTransaction has been processed
    pub active: bool,
    /// Meter value at stop (Wh)
    pub meter_stop: Option<i32>,
    /// Stop time as reported by the charge point
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Stop reason, when the charge point gave one
    pub stop_reason: Option<String>,
}

impl Transaction {
    pub fn start(
        transaction_id: i32,
        charge_point_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
        start_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            charge_point_id: charge_point_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            start_timestamp,
            active: true,
            meter_stop: None,
            end_timestamp: None,
            stop_reason: None,
        }
    }

    /// Close the transaction. A transaction that is already closed is left untouched.
    pub fn close(&mut self, meter_stop: i32, end_timestamp: DateTime<Utc>, reason: Option<String>) {
        if !self.active {
            return;
        }
        self.active = false;
        self.meter_stop = Some(meter_stop);
        self.end_timestamp = Some(end_timestamp);
        self.stop_reason = reason;
    }

    /// Energy delivered in Wh, once stopped
    pub fn energy_wh(&self) -> Option<i32> {
        self.meter_stop.map(|stop| stop - self.meter_start)
    }
}

/// Process-wide source of transaction IDs.
///
/// Shared by every session; seeded from the highest ID the store has ever
/// persisted so IDs stay unique across restarts.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicI32,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// First ID handed out will be `first`.
    pub fn starting_at(first: i32) -> Self {
        Self {
            next: AtomicI32::new(first.max(1)),
        }
    }

    /// Continue after the highest ID already persisted.
    pub fn after(last_persisted: Option<i32>) -> Self {
        Self::starting_at(last_persisted.map_or(1, |id| id.saturating_add(1)))
    }

    /// `None` once the ID space is used up; IDs never wrap.
    pub fn next_id(&self) -> Option<i32> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .ok()
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

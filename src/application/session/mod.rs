//! Per-connection session state
//!
//! A [`Session`] is owned by its connection's dispatcher task and is never
//! shared, so none of its tables need locking.

pub mod pending;
pub mod registry;
pub mod transactions;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

pub use pending::{AbandonReason, CallFailure, CallOutcome, PendingCalls};
pub use registry::{SessionCommand, SessionHandle, SessionRegistry, SharedSessionRegistry};
pub use transactions::{
    ConcurrentTx, ConnectorState, OpenTransaction, StartRefused, TransactionTable,
};

use crate::domain::{Transaction, TransactionIdGenerator};

pub struct Session {
    charge_point_id: String,
    pending: PendingCalls,
    transactions: TransactionTable,
}

impl Session {
    pub fn new(charge_point_id: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            pending: PendingCalls::new(call_timeout),
            transactions: TransactionTable::new(),
        }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingCalls {
        &mut self.pending
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut TransactionTable {
        &mut self.transactions
    }

    /// StartTransaction: Idle → Charging.
    ///
    /// An ID is drawn from `ids` only when the connector is idle, so a
    /// rejected start never consumes one.
    pub fn start_transaction(
        &mut self,
        ids: &TransactionIdGenerator,
        connector_id: u32,
        id_tag: &str,
        meter_start: i32,
        start_timestamp: DateTime<Utc>,
    ) -> Result<Transaction, StartRefused> {
        self.transactions.check_idle(connector_id)?;
        let transaction_id = ids.next_id().ok_or(StartRefused::IdsExhausted)?;
        let transaction = Transaction::start(
            transaction_id,
            self.charge_point_id.clone(),
            connector_id,
            id_tag,
            meter_start,
            start_timestamp,
        );
        self.transactions.begin(transaction.clone())?;
        Ok(transaction)
    }

    /// StopTransaction: Charging → Idle, for a transaction this session opened.
    pub fn stop_transaction(&mut self, transaction_id: i32) -> Option<OpenTransaction> {
        self.transactions.finish(transaction_id)
    }

    /// Abandon outstanding calls when the connection goes away.
    ///
    /// Open transactions are left active in the Store; a later StopTransaction
    /// on a new connection can still close them.
    pub fn teardown(&mut self) {
        let abandoned = self.pending.abandon_all(AbandonReason::Disconnected);
        let open = self.transactions.open_ids();
        info!(
            charge_point_id = self.charge_point_id.as_str(),
            abandoned_calls = abandoned,
            open_transactions = ?open,
            "Session torn down"
        );
    }
}

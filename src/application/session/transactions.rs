//! Per-session connector states and open transactions

use std::collections::HashMap;

use crate::application::persistence::PendingWrite;
use crate::domain::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Idle,
    Charging { transaction_id: i32 },
}

/// A transaction started in this session and not yet stopped.
#[derive(Debug)]
pub struct OpenTransaction {
    pub transaction: Transaction,
    /// Open write still running in the background, if any
    pub open_write: Option<PendingWrite<i32>>,
}

/// The connector already carries a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentTx {
    pub connector_id: u32,
    pub active_transaction_id: i32,
}

/// Why a StartTransaction did not open a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRefused {
    ConcurrentTx(ConcurrentTx),
    /// The process-wide transaction ID space is used up.
    IdsExhausted,
}

impl From<ConcurrentTx> for StartRefused {
    fn from(conflict: ConcurrentTx) -> Self {
        Self::ConcurrentTx(conflict)
    }
}

#[derive(Debug, Default)]
pub struct TransactionTable {
    connectors: HashMap<u32, ConnectorState>,
    open: HashMap<i32, OpenTransaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector_state(&self, connector_id: u32) -> ConnectorState {
        self.connectors
            .get(&connector_id)
            .copied()
            .unwrap_or(ConnectorState::Idle)
    }

    /// Fails without touching anything when the connector is already charging.
    pub fn check_idle(&self, connector_id: u32) -> Result<(), ConcurrentTx> {
        match self.connector_state(connector_id) {
            ConnectorState::Idle => Ok(()),
            ConnectorState::Charging { transaction_id } => Err(ConcurrentTx {
                connector_id,
                active_transaction_id: transaction_id,
            }),
        }
    }

    /// Idle → Charging.
    pub fn begin(&mut self, transaction: Transaction) -> Result<(), ConcurrentTx> {
        self.check_idle(transaction.connector_id)?;
        self.connectors.insert(
            transaction.connector_id,
            ConnectorState::Charging {
                transaction_id: transaction.transaction_id,
            },
        );
        self.open.insert(
            transaction.transaction_id,
            OpenTransaction {
                transaction,
                open_write: None,
            },
        );
        Ok(())
    }

    pub fn attach_open_write(&mut self, transaction_id: i32, write: PendingWrite<i32>) {
        if let Some(open) = self.open.get_mut(&transaction_id) {
            open.open_write = Some(write);
        }
    }

    /// Charging → Idle. `None` when the transaction is not open in this session.
    pub fn finish(&mut self, transaction_id: i32) -> Option<OpenTransaction> {
        let open = self.open.remove(&transaction_id)?;
        let connector_id = open.transaction.connector_id;
        if self.connector_state(connector_id) == (ConnectorState::Charging { transaction_id }) {
            self.connectors.insert(connector_id, ConnectorState::Idle);
        }
        Some(open)
    }

    pub fn get(&self, transaction_id: i32) -> Option<&Transaction> {
        self.open.get(&transaction_id).map(|o| &o.transaction)
    }

    pub fn open_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.open.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(id: i32, connector_id: u32) -> Transaction {
        Transaction::start(id, "CP1", connector_id, "TAG1", 0, Utc::now())
    }

    #[test]
    fn connector_cycles_idle_charging_idle() {
        let mut table = TransactionTable::new();
        assert_eq!(table.connector_state(1), ConnectorState::Idle);

        table.begin(tx(10, 1)).unwrap();
        assert_eq!(
            table.connector_state(1),
            ConnectorState::Charging { transaction_id: 10 }
        );

        let open = table.finish(10).unwrap();
        assert_eq!(open.transaction.transaction_id, 10);
        assert_eq!(table.connector_state(1), ConnectorState::Idle);
        assert!(table.is_empty());
    }

    #[test]
    fn second_start_on_charging_connector_conflicts() {
        let mut table = TransactionTable::new();
        table.begin(tx(10, 1)).unwrap();

        let conflict = table.begin(tx(11, 1)).unwrap_err();
        assert_eq!(
            conflict,
            ConcurrentTx {
                connector_id: 1,
                active_transaction_id: 10
            }
        );
        assert_eq!(table.open_ids(), vec![10]);

        table.begin(tx(12, 2)).unwrap();
        assert_eq!(table.open_ids(), vec![10, 12]);
    }

    #[test]
    fn unknown_or_repeated_finish_is_none() {
        let mut table = TransactionTable::new();
        assert!(table.finish(99).is_none());

        table.begin(tx(10, 1)).unwrap();
        assert!(table.finish(10).is_some());
        assert!(table.finish(10).is_none());
    }
}

//! Database storage implementation using SeaORM

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::{debug, info, warn};

use super::entities::{boot_notification, meter_reading, transaction};
use crate::domain::{BootRecord, CloseOutcome, MeterReading, Store, Transaction};
use crate::support::errors::StoreResult;

/// Database storage implementation
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get database connection reference
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn is_same_open(row: &transaction::Model, tx: &Transaction) -> bool {
    row.charge_point_id == tx.charge_point_id
        && row.connector_id == tx.connector_id as i32
        && row.id_tag == tx.id_tag
        && row.meter_start == tx.meter_start
        && row.started_at == tx.start_timestamp
}

fn transaction_model_to_domain(t: transaction::Model) -> Transaction {
    Transaction {
        transaction_id: t.id,
        charge_point_id: t.charge_point_id,
        connector_id: t.connector_id.max(0) as u32,
        id_tag: t.id_tag,
        meter_start: t.meter_start,
        start_timestamp: t.started_at,
        active: t.active,
        meter_stop: t.meter_stop,
        end_timestamp: t.stopped_at,
        stop_reason: t.stop_reason,
    }
}

#[async_trait]
impl Store for DatabaseStorage {
    async fn record_boot(&self, boot: BootRecord) -> StoreResult<()> {
        debug!(charge_point_id = boot.charge_point_id.as_str(), "Saving boot notification");

        let model = boot_notification::ActiveModel {
            id: NotSet,
            charge_point_id: Set(boot.charge_point_id),
            vendor: Set(boot.vendor),
            model: Set(boot.model),
            serial_number: Set(boot.serial_number),
            firmware_version: Set(boot.firmware_version),
            booted_at: Set(boot.booted_at),
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    async fn record_meter_values(&self, reading: MeterReading) -> StoreResult<()> {
        let samples = serde_json::to_string(&reading.samples)?;

        let model = meter_reading::ActiveModel {
            id: NotSet,
            charge_point_id: Set(reading.charge_point_id),
            connector_id: Set(reading.connector_id as i32),
            transaction_id: Set(reading.transaction_id),
            received_at: Set(reading.received_at),
            samples: Set(samples),
            energy_wh: Set(reading.energy_wh),
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    async fn open_transaction(&self, tx: Transaction) -> StoreResult<i32> {
        debug!(transaction_id = tx.transaction_id, "Saving transaction");

        let model = transaction::ActiveModel {
            id: Set(tx.transaction_id),
            charge_point_id: Set(tx.charge_point_id.clone()),
            connector_id: Set(tx.connector_id as i32),
            id_tag: Set(tx.id_tag.clone()),
            meter_start: Set(tx.meter_start),
            meter_stop: Set(tx.meter_stop),
            started_at: Set(tx.start_timestamp),
            stopped_at: Set(tx.end_timestamp),
            stop_reason: Set(tx.stop_reason.clone()),
            active: Set(tx.active),
        };
        match model.insert(&self.db).await {
            Ok(saved) => {
                info!(transaction_id = saved.id, "Transaction saved");
                Ok(saved.id)
            }
            Err(err) => {
                // A repeated open whose first insert committed is not a failure.
                let existing = transaction::Entity::find_by_id(tx.transaction_id)
                    .one(&self.db)
                    .await?;
                match existing {
                    Some(row) if is_same_open(&row, &tx) => {
                        debug!(transaction_id = row.id, "Transaction already saved");
                        Ok(row.id)
                    }
                    _ => {
                        warn!(transaction_id = tx.transaction_id, error = %err, "Failed to save transaction");
                        Err(err.into())
                    }
                }
            }
        }
    }

    async fn close_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        end_timestamp: DateTime<Utc>,
        reason: Option<String>,
    ) -> StoreResult<CloseOutcome> {
        let result = transaction::Entity::update_many()
            .col_expr(transaction::Column::MeterStop, Expr::value(meter_stop))
            .col_expr(transaction::Column::StoppedAt, Expr::value(end_timestamp))
            .col_expr(transaction::Column::StopReason, Expr::value(reason))
            .col_expr(transaction::Column::Active, Expr::value(false))
            .filter(transaction::Column::Id.eq(transaction_id))
            .filter(transaction::Column::Active.eq(true))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(transaction_id, meter_stop, "Transaction closed");
            return Ok(CloseOutcome::Closed);
        }

        // Already closed rows stay as they are; only a missing row is NotFound.
        let exists = transaction::Entity::find_by_id(transaction_id)
            .one(&self.db)
            .await?
            .is_some();
        Ok(if exists {
            CloseOutcome::Closed
        } else {
            CloseOutcome::NotFound
        })
    }

    async fn find_transaction(&self, transaction_id: i32) -> StoreResult<Option<Transaction>> {
        let model = transaction::Entity::find_by_id(transaction_id)
            .one(&self.db)
            .await?;
        Ok(model.map(transaction_model_to_domain))
    }

    async fn last_transaction_id(&self) -> StoreResult<Option<i32>> {
        let last = transaction::Entity::find()
            .order_by_desc(transaction::Column::Id)
            .limit(1)
            .one(&self.db)
            .await?;
        Ok(last.map(|t| t.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use sea_orm_migration::MigratorTrait;

    use crate::infrastructure::database::migrator::Migrator;

    async fn storage() -> DatabaseStorage {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        };
        let db = init_database(&config).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        DatabaseStorage::new(db)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn transaction_lifecycle() {
        let storage = storage().await;
        assert_eq!(storage.last_transaction_id().await.unwrap(), None);

        let tx = Transaction::start(17, "CP1", 2, "TAG1", 1000, ts("2024-01-01T10:00:00Z"));
        assert_eq!(storage.open_transaction(tx.clone()).await.unwrap(), 17);
        assert_eq!(storage.find_transaction(17).await.unwrap(), Some(tx));

        let outcome = storage
            .close_transaction(17, 1500, ts("2024-01-01T11:00:00Z"), Some("Local".into()))
            .await
            .unwrap();
        assert_eq!(outcome, CloseOutcome::Closed);

        let closed = storage.find_transaction(17).await.unwrap().unwrap();
        assert!(!closed.active);
        assert_eq!(closed.meter_stop, Some(1500));
        assert_eq!(closed.end_timestamp, Some(ts("2024-01-01T11:00:00Z")));
        assert_eq!(closed.stop_reason.as_deref(), Some("Local"));
        assert_eq!(storage.last_transaction_id().await.unwrap(), Some(17));
    }

    #[tokio::test]
    async fn repeated_open_of_the_same_transaction_succeeds() {
        let storage = storage().await;
        let tx = Transaction::start(5, "CP1", 1, "TAG1", 0, ts("2024-01-01T10:00:00Z"));
        assert_eq!(storage.open_transaction(tx.clone()).await.unwrap(), 5);
        assert_eq!(storage.open_transaction(tx).await.unwrap(), 5);
        assert_eq!(storage.last_transaction_id().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn conflicting_open_fails_without_retrying() {
        use crate::infrastructure::storage::RetryingStore;
        use crate::support::retry::RetryConfig;
        use std::time::Duration;

        let storage = storage().await;
        let first = Transaction::start(5, "CP1", 1, "TAG1", 0, ts("2024-01-01T10:00:00Z"));
        storage.open_transaction(first).await.unwrap();

        let retrying = RetryingStore::new(
            storage,
            RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_secs(2),
                backoff_multiplier: 1.0,
                max_delay: Duration::from_secs(2),
            },
        );
        let clash = Transaction::start(5, "CP2", 3, "TAG9", 40, ts("2024-01-01T12:00:00Z"));
        let err = tokio::time::timeout(Duration::from_secs(1), retrying.open_transaction(clash))
            .await
            .expect("a constraint violation is not retried")
            .unwrap_err();
        assert!(!err.is_transient());

        let stored = retrying.find_transaction(5).await.unwrap().unwrap();
        assert_eq!(stored.charge_point_id, "CP1");
    }

    #[tokio::test]
    async fn second_close_keeps_first_values() {
        let storage = storage().await;
        let tx = Transaction::start(1, "CP1", 1, "TAG1", 0, ts("2024-01-01T10:00:00Z"));
        storage.open_transaction(tx).await.unwrap();

        storage
            .close_transaction(1, 10, ts("2024-01-01T11:00:00Z"), None)
            .await
            .unwrap();
        let again = storage
            .close_transaction(1, 99, ts("2024-01-02T11:00:00Z"), None)
            .await
            .unwrap();

        assert_eq!(again, CloseOutcome::Closed);
        let stored = storage.find_transaction(1).await.unwrap().unwrap();
        assert_eq!(stored.meter_stop, Some(10));
    }

    #[tokio::test]
    async fn close_unknown_transaction_is_not_found() {
        let storage = storage().await;
        let outcome = storage
            .close_transaction(404, 10, ts("2024-01-01T11:00:00Z"), None)
            .await
            .unwrap();
        assert_eq!(outcome, CloseOutcome::NotFound);
    }

    #[tokio::test]
    async fn boot_and_meter_rows_are_inserted() {
        let storage = storage().await;
        storage
            .record_boot(BootRecord {
                charge_point_id: "CP1".into(),
                vendor: "Acme".into(),
                model: "X1".into(),
                serial_number: Some("SN-1".into()),
                firmware_version: None,
                booted_at: ts("2024-01-01T09:00:00Z"),
            })
            .await
            .unwrap();
        storage
            .record_meter_values(MeterReading {
                charge_point_id: "CP1".into(),
                connector_id: 1,
                transaction_id: Some(3),
                received_at: ts("2024-01-01T09:05:00Z"),
                samples: serde_json::json!([{"timestamp": "2024-01-01T09:05:00Z", "sampledValue": []}]),
                energy_wh: Some(1200.0),
            })
            .await
            .unwrap();

        let boots = boot_notification::Entity::find()
            .all(storage.connection())
            .await
            .unwrap();
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].vendor, "Acme");

        let readings = meter_reading::Entity::find()
            .all(storage.connection())
            .await
            .unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].transaction_id, Some(3));
        assert_eq!(readings[0].energy_wh, Some(1200.0));
    }
}

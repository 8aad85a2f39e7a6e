//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_boot_notifications;
mod m20240101_000002_create_meter_readings;
mod m20240101_000003_create_transactions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_boot_notifications::Migration),
            Box::new(m20240101_000002_create_meter_readings::Migration),
            Box::new(m20240101_000003_create_transactions::Migration),
        ]
    }
}

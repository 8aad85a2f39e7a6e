//! Create boot_notifications table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BootNotifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BootNotifications::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BootNotifications::ChargePointId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BootNotifications::Vendor).string().not_null())
                    .col(ColumnDef::new(BootNotifications::Model).string().not_null())
                    .col(ColumnDef::new(BootNotifications::SerialNumber).string())
                    .col(ColumnDef::new(BootNotifications::FirmwareVersion).string())
                    .col(
                        ColumnDef::new(BootNotifications::BootedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_boot_notifications_charge_point")
                    .table(BootNotifications::Table)
                    .col(BootNotifications::ChargePointId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BootNotifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum BootNotifications {
    Table,
    Id,
    ChargePointId,
    Vendor,
    Model,
    SerialNumber,
    FirmwareVersion,
    BootedAt,
}

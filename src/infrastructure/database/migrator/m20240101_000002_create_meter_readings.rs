//! Create meter_readings table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MeterReadings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MeterReadings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MeterReadings::ChargePointId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MeterReadings::ConnectorId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MeterReadings::TransactionId).integer())
                    .col(
                        ColumnDef::new(MeterReadings::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MeterReadings::Samples).text().not_null())
                    .col(ColumnDef::new(MeterReadings::EnergyWh).double())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_meter_readings_charge_point_connector")
                    .table(MeterReadings::Table)
                    .col(MeterReadings::ChargePointId)
                    .col(MeterReadings::ConnectorId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MeterReadings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum MeterReadings {
    Table,
    Id,
    ChargePointId,
    ConnectorId,
    TransactionId,
    ReceivedAt,
    Samples,
    EnergyWh,
}

//! Meter reading (telemetry) entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meter_readings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: i32,
    #[sea_orm(nullable)]
    pub transaction_id: Option<i32>,
    pub received_at: DateTimeUtc,
    /// `meterValue` array as JSON text
    #[sea_orm(column_type = "Text")]
    pub samples: String,
    #[sea_orm(nullable, column_type = "Double")]
    pub energy_wh: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

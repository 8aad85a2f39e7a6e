//! Transaction entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Assigned by the central system, never by the database
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    pub charge_point_id: String,
    pub connector_id: i32,
    pub id_tag: String,

    /// Meter value at start (Wh)
    pub meter_start: i32,

    #[sea_orm(nullable)]
    pub meter_stop: Option<i32>,

    pub started_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub stopped_at: Option<DateTimeUtc>,

    /// EmergencyStop, EVDisconnected, HardReset, Local, Other, PowerLoss,
    /// Reboot, Remote, SoftReset, UnlockCommand, DeAuthorized
    #[sea_orm(nullable)]
    pub stop_reason: Option<String>,

    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

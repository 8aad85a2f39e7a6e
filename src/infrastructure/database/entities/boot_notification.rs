//! Boot notification log entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "boot_notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub charge_point_id: String,
    pub vendor: String,
    pub model: String,
    #[sea_orm(nullable)]
    pub serial_number: Option<String>,
    #[sea_orm(nullable)]
    pub firmware_version: Option<String>,
    pub booted_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

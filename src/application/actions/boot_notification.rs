//! BootNotification handler

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::info;

use super::{decode, encode, ActionContext, ActionHandler};
use crate::domain::BootRecord;
use crate::support::errors::CallRejection;

pub struct BootNotificationHandler;

#[async_trait]
impl ActionHandler for BootNotificationHandler {
    async fn handle(
        &self,
        ctx: &mut ActionContext<'_>,
        payload: Value,
    ) -> Result<Value, CallRejection> {
        let req: BootNotificationRequest = decode("BootNotification", payload)?;

        info!(
            charge_point_id = ctx.charge_point_id(),
            vendor = req.charge_point_vendor.as_str(),
            model = req.charge_point_model.as_str(),
            "BootNotification"
        );

        let now = Utc::now();
        // Failures are logged by the writer; the charge point is accepted regardless.
        let _ = ctx
            .services
            .writer
            .record_boot(BootRecord {
                charge_point_id: ctx.charge_point_id().to_string(),
                vendor: req.charge_point_vendor,
                model: req.charge_point_model,
                serial_number: req.charge_point_serial_number,
                firmware_version: req.firmware_version,
                booted_at: now,
            })
            .await;

        encode(&BootNotificationResponse {
            current_time: now,
            interval: ctx.services.heartbeat_interval,
            status: RegistrationStatus::Accepted,
        })
    }
}

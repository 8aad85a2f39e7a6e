//! MeterValues handler

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::types::{Measurand, MeterValue, UnitOfMeasure};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode, encode, ActionContext, ActionHandler};
use crate::domain::MeterReading;
use crate::support::errors::CallRejection;

pub struct MeterValuesHandler;

/// Last `Energy.Active.Import.Register` sample in Wh. A sample without a
/// measurand counts as energy, which is the OCPP default.
fn energy_wh(meter_values: &[MeterValue]) -> Option<f64> {
    let mut energy_wh = None;
    for meter_value in meter_values {
        for sampled in &meter_value.sampled_value {
            let value: f64 = match sampled.value.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };

            let measurand = sampled
                .measurand
                .clone()
                .unwrap_or(Measurand::EnergyActiveImportRegister);

            if matches!(measurand, Measurand::EnergyActiveImportRegister) {
                energy_wh = Some(match sampled.unit.as_ref() {
                    Some(UnitOfMeasure::KWh) => value * 1000.0,
                    _ => value,
                });
            }
        }
    }
    energy_wh
}

#[async_trait]
impl ActionHandler for MeterValuesHandler {
    async fn handle(
        &self,
        ctx: &mut ActionContext<'_>,
        payload: Value,
    ) -> Result<Value, CallRejection> {
        let samples = payload.get("meterValue").cloned().unwrap_or(Value::Null);
        let req: MeterValuesRequest = decode("MeterValues", payload)?;
        let energy_wh = energy_wh(&req.meter_value);

        info!(
            charge_point_id = ctx.charge_point_id(),
            connector_id = req.connector_id,
            transaction_id = ?req.transaction_id,
            samples = req.meter_value.len(),
            ?energy_wh,
            "MeterValues"
        );

        if let Some(transaction_id) = req.transaction_id {
            if ctx.session.transactions().get(transaction_id).is_none() {
                debug!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    "MeterValues for a transaction not open in this session"
                );
            }
        }

        let _ = ctx
            .services
            .writer
            .record_meter_values(MeterReading {
                charge_point_id: ctx.charge_point_id().to_string(),
                connector_id: req.connector_id,
                transaction_id: req.transaction_id,
                received_at: Utc::now(),
                samples,
                energy_wh,
            })
            .await;

        encode(&MeterValuesResponse {})
    }
}

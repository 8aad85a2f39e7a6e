//! StopTransaction handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::{error, info, warn};

use super::{decode, encode, ActionContext, ActionHandler};
use crate::application::persistence::{PendingWrite, WriteAck};
use crate::domain::CloseOutcome;
use crate::support::errors::CallRejection;

pub struct StopTransactionHandler;

impl StopTransactionHandler {
    /// The transaction is not open in this session. Close it only if the
    /// Store knows it as active and it belongs to this charge point.
    async fn stop_from_store(&self, ctx: &ActionContext<'_>, req: &StopTransactionRequest) -> bool {
        let transaction_id = req.transaction_id;
        match ctx.services.writer.find_transaction(transaction_id).await {
            Ok(Some(tx)) if tx.active && tx.charge_point_id == ctx.charge_point_id() => {
                info!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    "Closing transaction opened on an earlier connection"
                );
                true
            }
            Ok(Some(tx)) if !tx.active => {
                warn!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    "StopTransaction for a transaction that is already closed"
                );
                false
            }
            Ok(Some(tx)) => {
                warn!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    owner = tx.charge_point_id.as_str(),
                    "StopTransaction for a transaction owned by another charge point"
                );
                false
            }
            Ok(None) => {
                warn!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    "StopTransaction for unknown transaction"
                );
                false
            }
            Err(e) => {
                error!(
                    charge_point_id = ctx.charge_point_id(),
                    transaction_id,
                    error = %e,
                    "Failed to look up transaction for StopTransaction"
                );
                false
            }
        }
    }
}

#[async_trait]
impl ActionHandler for StopTransactionHandler {
    async fn handle(
        &self,
        ctx: &mut ActionContext<'_>,
        payload: Value,
    ) -> Result<Value, CallRejection> {
        let req: StopTransactionRequest = decode("StopTransaction", payload)?;
        let transaction_id = req.transaction_id;

        info!(
            charge_point_id = ctx.charge_point_id(),
            transaction_id,
            meter_stop = req.meter_stop,
            "StopTransaction"
        );

        let close: Option<Option<PendingWrite<i32>>> =
            match ctx.session.stop_transaction(transaction_id) {
                Some(open) => Some(open.open_write),
                None if self.stop_from_store(ctx, &req).await => Some(None),
                None => None,
            };

        if let Some(after) = close {
            let reason = req.reason.as_ref().map(|r| format!("{:?}", r));
            let ack = ctx
                .services
                .writer
                .close_transaction(transaction_id, req.meter_stop, req.timestamp, reason, after)
                .await;
            match ack {
                WriteAck::Done(CloseOutcome::Closed) => {
                    info!(
                        charge_point_id = ctx.charge_point_id(),
                        transaction_id,
                        "Transaction stopped"
                    );
                }
                WriteAck::Done(CloseOutcome::NotFound) => {
                    warn!(
                        charge_point_id = ctx.charge_point_id(),
                        transaction_id,
                        "Store has no record of the stopped transaction"
                    );
                }
                WriteAck::Failed(_) | WriteAck::InFlight(_) => {}
            }
        }

        encode(&StopTransactionResponse {
            id_tag_info: Some(IdTagInfo {
                status: AuthorizationStatus::Accepted,
                expiry_date: None,
                parent_id_tag: None,
            }),
        })
    }
}

//! StartTransaction handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::{error, info, warn};

use super::{decode, encode, ActionContext, ActionHandler};
use crate::application::persistence::WriteAck;
use crate::application::session::StartRefused;
use crate::support::errors::CallRejection;

pub struct StartTransactionHandler;

fn id_tag_info(status: AuthorizationStatus) -> IdTagInfo {
    IdTagInfo {
        status,
        expiry_date: None,
        parent_id_tag: None,
    }
}

#[async_trait]
impl ActionHandler for StartTransactionHandler {
    async fn handle(
        &self,
        ctx: &mut ActionContext<'_>,
        payload: Value,
    ) -> Result<Value, CallRejection> {
        let req: StartTransactionRequest = decode("StartTransaction", payload)?;

        info!(
            charge_point_id = ctx.charge_point_id(),
            connector_id = req.connector_id,
            id_tag = req.id_tag.as_str(),
            meter_start = req.meter_start,
            "StartTransaction"
        );

        let started = ctx.session.start_transaction(
            &ctx.services.ids,
            req.connector_id,
            &req.id_tag,
            req.meter_start,
            req.timestamp,
        );

        let transaction = match started {
            Ok(transaction) => transaction,
            Err(StartRefused::IdsExhausted) => {
                error!(
                    charge_point_id = ctx.charge_point_id(),
                    connector_id = req.connector_id,
                    "No transaction IDs left"
                );
                return Err(CallRejection::internal("Transaction IDs exhausted"));
            }
            Err(StartRefused::ConcurrentTx(conflict)) => {
                warn!(
                    charge_point_id = ctx.charge_point_id(),
                    connector_id = conflict.connector_id,
                    active_transaction_id = conflict.active_transaction_id,
                    "StartTransaction on a connector that is already charging"
                );
                return encode(&StartTransactionResponse {
                    transaction_id: 0,
                    id_tag_info: id_tag_info(AuthorizationStatus::ConcurrentTx),
                });
            }
        };

        let transaction_id = transaction.transaction_id;
        match ctx.services.writer.open_transaction(transaction).await {
            WriteAck::Done(_) | WriteAck::Failed(_) => {}
            WriteAck::InFlight(write) => ctx
                .session
                .transactions_mut()
                .attach_open_write(transaction_id, write),
        }

        info!(
            charge_point_id = ctx.charge_point_id(),
            transaction_id,
            "Transaction started"
        );

        encode(&StartTransactionResponse {
            transaction_id,
            id_tag_info: id_tag_info(AuthorizationStatus::Accepted),
        })
    }
}

//! Action registry: OCPP action name → request schema + handler
//!
//! The dispatcher looks an incoming CALL's action up here. Actions that are
//! not registered are answered with `NotImplemented`.

mod boot_notification;
mod meter_values;
pub mod schema;
mod start_transaction;
mod stop_transaction;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use boot_notification::BootNotificationHandler;
pub use meter_values::MeterValuesHandler;
pub use schema::{FieldKind, RequestSchema, SchemaViolation};
pub use start_transaction::StartTransactionHandler;
pub use stop_transaction::StopTransactionHandler;

use crate::application::persistence::StoreWriter;
use crate::application::session::Session;
use crate::domain::TransactionIdGenerator;
use crate::support::errors::CallRejection;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionServices {
    pub writer: StoreWriter,
    pub ids: Arc<TransactionIdGenerator>,
    /// Heartbeat interval handed out in BootNotification responses (seconds)
    pub heartbeat_interval: u32,
}

/// What a handler gets to work with for one CALL.
pub struct ActionContext<'a> {
    pub session: &'a mut Session,
    pub services: &'a SessionServices,
}

impl ActionContext<'_> {
    pub fn charge_point_id(&self) -> &str {
        self.session.charge_point_id()
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Handle a schema-checked payload and return the CALLRESULT payload.
    async fn handle(&self, ctx: &mut ActionContext<'_>, payload: Value)
        -> Result<Value, CallRejection>;
}

pub struct RegisteredAction {
    pub schema: RequestSchema,
    pub handler: Arc<dyn ActionHandler>,
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The OCPP 1.6 actions this central system answers.
    pub fn ocpp16() -> Self {
        let mut registry = Self::new();
        registry.register(
            "BootNotification",
            RequestSchema::new()
                .require("chargePointModel", FieldKind::String)
                .require("chargePointVendor", FieldKind::String),
            BootNotificationHandler,
        );
        registry.register(
            "MeterValues",
            RequestSchema::new()
                .require("connectorId", FieldKind::Integer)
                .require("meterValue", FieldKind::Array),
            MeterValuesHandler,
        );
        registry.register(
            "StartTransaction",
            RequestSchema::new()
                .require("connectorId", FieldKind::Integer)
                .require("idTag", FieldKind::String)
                .require("meterStart", FieldKind::Integer)
                .require("timestamp", FieldKind::Timestamp),
            StartTransactionHandler,
        );
        registry.register(
            "StopTransaction",
            RequestSchema::new()
                .require("transactionId", FieldKind::Integer)
                .require("meterStop", FieldKind::Integer)
                .require("timestamp", FieldKind::Timestamp),
            StopTransactionHandler,
        );
        registry
    }

    /// Add or replace an action.
    pub fn register(
        &mut self,
        action: impl Into<String>,
        schema: RequestSchema,
        handler: impl ActionHandler + 'static,
    ) {
        self.actions.insert(
            action.into(),
            RegisteredAction {
                schema,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn resolve(&self, action: &str) -> Option<&RegisteredAction> {
        self.actions.get(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// Decode a payload into its `rust-ocpp` request type.
pub(crate) fn decode<T: DeserializeOwned>(action: &str, payload: Value) -> Result<T, CallRejection> {
    serde_json::from_value(payload)
        .map_err(|e| CallRejection::formation(format!("Invalid {} payload: {}", action, e)))
}

/// Encode a `rust-ocpp` response type.
pub(crate) fn encode<T: Serialize>(response: &T) -> Result<Value, CallRejection> {
    serde_json::to_value(response)
        .map_err(|e| CallRejection::internal(format!("Failed to encode response: {}", e)))
}

//! Per-connection dispatcher
//!
//! Owns the [`Session`] and runs the connection's loop: inbound frames from
//! the charge point, commands from other tasks, and the earliest pending-call
//! deadline. Everything the charge point is sent goes through the outbound
//! channel as serialized text.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::actions::{ActionContext, ActionRegistry, SessionServices};
use super::session::{CallFailure, CallOutcome, Session, SessionCommand};
use crate::support::errors::ErrorCode;
use crate::support::ocpp_frame::OcppFrame;

pub struct Dispatcher {
    session: Session,
    actions: Arc<ActionRegistry>,
    services: SessionServices,
}

impl Dispatcher {
    pub fn new(session: Session, actions: Arc<ActionRegistry>, services: SessionServices) -> Self {
        Self {
            session,
            actions,
            services,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn charge_point_id(&self) -> &str {
        self.session.charge_point_id()
    }

    fn call_error(&self, unique_id: String, code: ErrorCode, description: String) -> String {
        metrics::counter!("ocpp_call_errors_sent_total", "code" => code.to_string()).increment(1);
        warn!(
            charge_point_id = self.charge_point_id(),
            message_id = unique_id.as_str(),
            code = %code,
            description = description.as_str(),
            "Answering with CallError"
        );
        OcppFrame::error_response(unique_id, code, description).serialize()
    }

    /// Process one inbound text frame and return the reply to send, if any.
    pub async fn handle_text(&mut self, text: &str) -> Option<String> {
        metrics::counter!("ocpp_frames_received_total").increment(1);

        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                return match err.unique_id {
                    Some(unique_id) => Some(self.call_error(
                        unique_id,
                        ErrorCode::FormationViolation,
                        err.kind.to_string(),
                    )),
                    None => {
                        warn!(
                            charge_point_id = self.charge_point_id(),
                            error = %err,
                            "Dropping undecodable message"
                        );
                        None
                    }
                };
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.handle_call(unique_id, action, payload).await),
            OcppFrame::CallResult { unique_id, payload } => {
                if !self.session.pending_mut().resolve_result(&unique_id, payload) {
                    warn!(
                        charge_point_id = self.charge_point_id(),
                        message_id = unique_id.as_str(),
                        "CallResult for unknown message, discarding"
                    );
                }
                None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                let resolved = self.session.pending_mut().resolve_error(
                    &unique_id,
                    error_code,
                    error_description,
                    error_details,
                );
                if !resolved {
                    warn!(
                        charge_point_id = self.charge_point_id(),
                        message_id = unique_id.as_str(),
                        "CallError for unknown message, discarding"
                    );
                }
                None
            }
        }
    }

    async fn handle_call(&mut self, unique_id: String, action: String, payload: Value) -> String {
        debug!(
            charge_point_id = self.charge_point_id(),
            message_id = unique_id.as_str(),
            action = action.as_str(),
            "Call received"
        );

        let Some(registered) = self.actions.resolve(&action) else {
            return self.call_error(
                unique_id,
                ErrorCode::NotImplemented,
                format!("Action {} is not implemented", action),
            );
        };

        if let Err(violation) = registered.schema.validate(&payload) {
            return self.call_error(unique_id, ErrorCode::FormationViolation, violation.to_string());
        }

        let handler = registered.handler.clone();
        let mut ctx = ActionContext {
            session: &mut self.session,
            services: &self.services,
        };
        match handler.handle(&mut ctx, payload).await {
            Ok(response) => OcppFrame::CallResult {
                unique_id,
                payload: response,
            }
            .serialize(),
            Err(rejection) => self.call_error(unique_id, rejection.code, rejection.description),
        }
    }

    /// Register an outbound CALL and return the frame to send.
    pub fn start_call(
        &mut self,
        action: String,
        payload: Value,
        reply: oneshot::Sender<CallOutcome>,
    ) -> Option<String> {
        if !payload.is_object() {
            let _ = reply.send(Err(CallFailure::SendFailed(
                "payload must be a JSON object".to_string(),
            )));
            return None;
        }

        let unique_id = uuid::Uuid::new_v4().to_string();
        if !self
            .session
            .pending_mut()
            .register(unique_id.clone(), action.clone(), reply)
        {
            return None;
        }

        info!(
            charge_point_id = self.charge_point_id(),
            message_id = unique_id.as_str(),
            action = action.as_str(),
            "Sending call"
        );
        Some(
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            }
            .serialize(),
        )
    }

    /// Run until the connection closes or the session is told to stop.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Session {
        let mut commands_open = true;

        loop {
            let deadline = self.session.pending().next_deadline();

            tokio::select! {
                text = inbound.recv() => {
                    let Some(text) = text else {
                        debug!(charge_point_id = self.charge_point_id(), "Inbound stream ended");
                        break;
                    };
                    if let Some(reply) = self.handle_text(&text).await {
                        if outbound.send(reply).is_err() {
                            break;
                        }
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Call { action, payload, reply }) => {
                        if let Some(frame) = self.start_call(action, payload, reply) {
                            if outbound.send(frame).is_err() {
                                break;
                            }
                        }
                    }
                    Some(SessionCommand::Close) => {
                        info!(charge_point_id = self.charge_point_id(), "Session close requested");
                        break;
                    }
                    None => commands_open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    let expired = self.session.pending_mut().expire(Instant::now());
                    debug!(charge_point_id = self.charge_point_id(), expired, "Pending calls timed out");
                }
            }
        }

        self.session.teardown();
        self.session
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::persistence::StoreWriter;
    use crate::application::session::{AbandonReason, ConnectorState, SessionRegistry};
    use crate::domain::{Store, Transaction, TransactionIdGenerator};
    use crate::infrastructure::storage::InMemoryStore;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn services(store: Arc<InMemoryStore>) -> SessionServices {
        SessionServices {
            writer: StoreWriter::new(store, Duration::from_millis(500)),
            ids: Arc::new(TransactionIdGenerator::new()),
            heartbeat_interval: 10,
        }
    }

    fn dispatcher_for(cp: &str, store: Arc<InMemoryStore>, ids: Arc<TransactionIdGenerator>) -> Dispatcher {
        let mut services = services(store);
        services.ids = ids;
        Dispatcher::new(
            Session::new(cp, Duration::from_secs(30)),
            Arc::new(ActionRegistry::ocpp16()),
            services,
        )
    }

    fn dispatcher(store: Arc<InMemoryStore>) -> Dispatcher {
        dispatcher_for("CP1", store, Arc::new(TransactionIdGenerator::new()))
    }

    async fn call(d: &mut Dispatcher, id: &str, action: &str, payload: Value) -> OcppFrame {
        let text = json!([2, id, action, payload]).to_string();
        let reply = d.handle_text(&text).await.expect("a CALL always gets a reply");
        OcppFrame::parse(&reply).unwrap()
    }

    fn result_payload(frame: OcppFrame) -> Value {
        match frame {
            OcppFrame::CallResult { payload, .. } => payload,
            other => panic!("expected CallResult, got {:?}", other),
        }
    }

    fn error_code(frame: &OcppFrame) -> &str {
        match frame {
            OcppFrame::CallError { error_code, .. } => error_code,
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    fn start(connector_id: u32) -> Value {
        json!({"connectorId": connector_id, "idTag": "TAG1", "meterStart": 100, "timestamp": "2024-01-01T00:00:00Z"})
    }

    #[tokio::test]
    async fn boot_notification_is_accepted() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let frame = call(
            &mut d,
            "b1",
            "BootNotification",
            json!({"chargePointModel": "X1", "chargePointVendor": "Acme"}),
        )
        .await;
        assert_eq!(frame.unique_id(), "b1");

        let payload = result_payload(frame);
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 10);
        let current_time = payload["currentTime"].as_str().unwrap();
        assert!(current_time.parse::<DateTime<Utc>>().is_ok());

        let boots = store.boots();
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].charge_point_id, "CP1");
        assert_eq!(boots[0].model, "X1");
    }

    #[tokio::test]
    async fn start_then_stop_closes_the_record() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let started = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        assert_eq!(started["idTagInfo"]["status"], "Accepted");
        let transaction_id = started["transactionId"].as_i64().unwrap() as i32;
        assert!(transaction_id > 0);

        let stopped = result_payload(
            call(
                &mut d,
                "s2",
                "StopTransaction",
                json!({"transactionId": transaction_id, "meterStop": 150, "timestamp": "2024-01-01T01:00:00Z"}),
            )
            .await,
        );
        assert_eq!(stopped["idTagInfo"]["status"], "Accepted");

        let all = store.transactions();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].transaction_id, transaction_id);
        assert!(!all[0].active);
        assert_eq!(all[0].meter_stop, Some(150));
        assert_eq!(all[0].meter_start, 100);
    }

    #[tokio::test]
    async fn second_start_on_charging_connector_is_concurrent_tx() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let first = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        let writes = store.write_count();

        let second = result_payload(call(&mut d, "s2", "StartTransaction", start(1)).await);
        assert_eq!(second["idTagInfo"]["status"], "ConcurrentTx");
        assert_eq!(second["transactionId"], 0);
        assert_eq!(store.write_count(), writes);

        let other = result_payload(call(&mut d, "s3", "StartTransaction", start(2)).await);
        assert_ne!(other["transactionId"], first["transactionId"]);
    }

    #[tokio::test]
    async fn stop_for_unknown_transaction_is_accepted_without_writes() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let stopped = result_payload(
            call(
                &mut d,
                "x1",
                "StopTransaction",
                json!({"transactionId": 999, "meterStop": 1, "timestamp": "2024-01-01T01:00:00Z"}),
            )
            .await,
        );
        assert_eq!(stopped["idTagInfo"]["status"], "Accepted");
        assert_eq!(store.write_count(), 0);
        assert!(store.transactions().is_empty());
    }

    #[tokio::test]
    async fn stop_after_reconnect_closes_through_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let ids = Arc::new(TransactionIdGenerator::new());

        let mut first = dispatcher_for("CP1", store.clone(), ids.clone());
        let started = result_payload(call(&mut first, "s1", "StartTransaction", start(1)).await);
        let transaction_id = started["transactionId"].clone();
        drop(first);

        // Another charge point may not close it.
        let mut intruder = dispatcher_for("CP2", store.clone(), ids.clone());
        call(
            &mut intruder,
            "x1",
            "StopTransaction",
            json!({"transactionId": transaction_id, "meterStop": 5, "timestamp": "2024-01-01T01:00:00Z"}),
        )
        .await;
        assert!(store.transactions()[0].active);

        let mut second = dispatcher_for("CP1", store.clone(), ids);
        call(
            &mut second,
            "s2",
            "StopTransaction",
            json!({"transactionId": transaction_id, "meterStop": 150, "timestamp": "2024-01-01T01:00:00Z"}),
        )
        .await;
        let stored = &store.transactions()[0];
        assert!(!stored.active);
        assert_eq!(stored.meter_stop, Some(150));
    }

    #[tokio::test]
    async fn unknown_action_is_not_implemented_and_session_survives() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store);

        let frame = call(&mut d, "f1", "Foo", json!({})).await;
        assert_eq!(frame.unique_id(), "f1");
        assert_eq!(error_code(&frame), "NotImplemented");

        let boot = call(
            &mut d,
            "b1",
            "BootNotification",
            json!({"chargePointModel": "X1", "chargePointVendor": "Acme"}),
        )
        .await;
        assert!(boot.is_call_result());
    }

    #[tokio::test]
    async fn schema_failure_is_formation_violation() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let frame = call(&mut d, "s1", "StartTransaction", json!({"connectorId": 1, "idTag": "TAG1"})).await;
        assert_eq!(error_code(&frame), "FormationViolation");
        match frame {
            OcppFrame::CallError { error_description, .. } => {
                assert!(error_description.contains("meterStart"));
            }
            _ => unreachable!(),
        }

        let frame = call(
            &mut d,
            "s2",
            "StartTransaction",
            json!({"connectorId": -1, "idTag": "TAG1", "meterStart": 0, "timestamp": "2024-01-01T00:00:00Z"}),
        )
        .await;
        assert_eq!(error_code(&frame), "FormationViolation");
        assert!(store.transactions().is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_never_panic() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store);

        for text in [
            "",
            "not json",
            "{}",
            "[]",
            "[2, 5, \"BootNotification\", {}]",
            "[2, \"\", \"BootNotification\", {}]",
        ] {
            assert_eq!(d.handle_text(text).await, None, "input {:?}", text);
        }

        for text in [
            "[2, \"m1\", \"BootNotification\"]",
            "[9, \"m1\", {}]",
            "[\"2\", \"m1\", \"BootNotification\", {}]",
            "[2, \"m1\", \"BootNotification\", []]",
            "[3, \"m1\", {}, {}]",
            "[4, \"m1\", \"GenericError\", \"x\"]",
        ] {
            let reply = d.handle_text(text).await.expect("id was recoverable");
            let frame = OcppFrame::parse(&reply).unwrap();
            assert_eq!(frame.unique_id(), "m1");
            assert_eq!(error_code(&frame), "FormationViolation");
        }
    }

    #[tokio::test]
    async fn orphan_replies_are_discarded() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store);
        assert_eq!(d.handle_text("[3, \"nobody\", {}]").await, None);
        assert_eq!(
            d.handle_text("[4, \"nobody\", \"GenericError\", \"\", {}]").await,
            None
        );
    }

    #[tokio::test]
    async fn store_outage_does_not_suppress_replies() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let mut d = dispatcher(store.clone());

        let boot = call(
            &mut d,
            "b1",
            "BootNotification",
            json!({"chargePointModel": "X1", "chargePointVendor": "Acme"}),
        )
        .await;
        assert!(boot.is_call_result());

        let started = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        assert_eq!(started["idTagInfo"]["status"], "Accepted");
        let transaction_id = started["transactionId"].as_i64().unwrap() as i32;

        let metered = call(
            &mut d,
            "m1",
            "MeterValues",
            json!({"connectorId": 1, "transactionId": transaction_id, "meterValue": []}),
        )
        .await;
        assert_eq!(result_payload(metered), json!({}));

        let stopped = result_payload(
            call(
                &mut d,
                "s2",
                "StopTransaction",
                json!({"transactionId": transaction_id, "meterStop": 150, "timestamp": "2024-01-01T01:00:00Z"}),
            )
            .await,
        );
        assert_eq!(stopped["idTagInfo"]["status"], "Accepted");
        assert_eq!(
            d.session().transactions().connector_state(1),
            ConnectorState::Idle
        );

        assert_eq!(store.write_count(), 0);
        assert!(store.transactions().is_empty());
        assert!(store.meter_readings().is_empty());
    }

    #[tokio::test]
    async fn meter_values_are_accepted_in_any_state() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());

        let started = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        let transaction_id = started["transactionId"].as_i64().unwrap() as i32;

        let during = json!({
            "connectorId": 1,
            "transactionId": transaction_id,
            "meterValue": [{
                "timestamp": "2024-01-01T00:30:00Z",
                "sampledValue": [
                    {"value": "230.1", "measurand": "Voltage", "unit": "V"},
                    {"value": "1.25", "measurand": "Energy.Active.Import.Register", "unit": "kWh"}
                ]
            }]
        });
        let reply = d
            .handle_text(&json!([2, "m1", "MeterValues", during]).to_string())
            .await
            .unwrap();
        assert_eq!(reply, r#"[3,"m1",{}]"#);

        let idle = json!({
            "connectorId": 2,
            "meterValue": [{
                "timestamp": "2024-01-01T00:31:00Z",
                "sampledValue": [{"value": "880"}]
            }]
        });
        let reply = d
            .handle_text(&json!([2, "m2", "MeterValues", idle]).to_string())
            .await
            .unwrap();
        assert_eq!(reply, r#"[3,"m2",{}]"#);

        let readings = store.meter_readings();
        assert_eq!(readings.len(), 2);

        assert_eq!(readings[0].charge_point_id, "CP1");
        assert_eq!(readings[0].connector_id, 1);
        assert_eq!(readings[0].transaction_id, Some(transaction_id));
        assert_eq!(readings[0].energy_wh, Some(1250.0));
        assert_eq!(readings[0].samples, during["meterValue"]);

        assert_eq!(readings[1].connector_id, 2);
        assert_eq!(readings[1].transaction_id, None);
        assert_eq!(readings[1].energy_wh, Some(880.0));

        // Metering does not disturb the running transaction.
        assert_eq!(
            d.session().transactions().connector_state(1),
            ConnectorState::Charging { transaction_id }
        );
    }

    #[tokio::test]
    async fn exhausted_transaction_ids_are_an_internal_error() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher_for(
            "CP1",
            store.clone(),
            Arc::new(TransactionIdGenerator::after(Some(i32::MAX))),
        );

        let frame = call(&mut d, "s1", "StartTransaction", start(1)).await;
        assert_eq!(error_code(&frame), "InternalError");
        assert!(store.transactions().is_empty());
        assert_eq!(
            d.session().transactions().connector_state(1),
            ConnectorState::Idle
        );
    }

    #[tokio::test]
    async fn slow_store_open_is_chained_before_close() {
        let store = Arc::new(InMemoryStore::new());
        store.set_write_delay(Duration::from_millis(200));
        let mut services = services(store.clone());
        services.writer = StoreWriter::new(store.clone(), Duration::from_millis(20));
        let mut d = Dispatcher::new(
            Session::new("CP1", Duration::from_secs(30)),
            Arc::new(ActionRegistry::ocpp16()),
            services,
        );

        let started = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        let transaction_id = started["transactionId"].as_i64().unwrap() as i32;
        assert!(store.transaction(transaction_id).is_none());

        call(
            &mut d,
            "s2",
            "StopTransaction",
            json!({"transactionId": transaction_id, "meterStop": 150, "timestamp": "2024-01-01T01:00:00Z"}),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let stored = store.transaction(transaction_id).unwrap();
        assert!(!stored.active);
        assert_eq!(stored.meter_stop, Some(150));
    }

    #[tokio::test]
    async fn outbound_call_times_out_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        let d = Dispatcher::new(
            Session::new("CP1", Duration::from_millis(50)),
            Arc::new(ActionRegistry::ocpp16()),
            services(store),
        );

        let registry = SessionRegistry::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(8);
        let handle = registry.register("CP1", command_tx);
        let task = tokio::spawn(d.run(inbound_rx, outbound_tx, command_rx));

        let outcome = handle.call("Reset", json!({"type": "Soft"})).await;
        assert_eq!(outcome, Err(CallFailure::Abandoned(AbandonReason::Timeout)));

        let sent = OcppFrame::parse(&outbound_rx.recv().await.unwrap()).unwrap();
        assert!(sent.is_call());

        // A late reply finds nothing to resolve and the session keeps serving.
        inbound_tx
            .send(json!([3, sent.unique_id(), {"status": "Accepted"}]).to_string())
            .unwrap();
        inbound_tx
            .send(json!([2, "b1", "BootNotification", {"chargePointModel": "X1", "chargePointVendor": "Acme"}]).to_string())
            .unwrap();
        let reply = OcppFrame::parse(&outbound_rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply.unique_id(), "b1");
        assert!(reply.is_call_result());

        drop(inbound_tx);
        let session = task.await.unwrap();
        assert!(session.pending().is_empty());
    }

    #[tokio::test]
    async fn outbound_call_gets_its_result() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(d.run(inbound_rx, outbound_tx, command_rx));

        let (reply, outcome) = oneshot::channel();
        command_tx
            .send(SessionCommand::Call {
                action: "UnlockConnector".into(),
                payload: json!({"connectorId": 1}),
                reply,
            })
            .await
            .unwrap();

        let sent = OcppFrame::parse(&outbound_rx.recv().await.unwrap()).unwrap();
        match &sent {
            OcppFrame::Call { action, payload, .. } => {
                assert_eq!(action, "UnlockConnector");
                assert_eq!(payload["connectorId"], 1);
            }
            other => panic!("expected Call, got {:?}", other),
        }
        inbound_tx
            .send(json!([3, sent.unique_id(), {"status": "Unlocked"}]).to_string())
            .unwrap();

        assert_eq!(outcome.await.unwrap(), Ok(json!({"status": "Unlocked"})));

        command_tx.send(SessionCommand::Close).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_abandons_pending_and_keeps_transactions_active() {
        let store = Arc::new(InMemoryStore::new());
        let mut d = dispatcher(store.clone());
        let started = result_payload(call(&mut d, "s1", "StartTransaction", start(1)).await);
        let transaction_id = started["transactionId"].as_i64().unwrap() as i32;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(d.run(inbound_rx, outbound_tx, command_rx));

        let (reply, outcome) = oneshot::channel();
        command_tx
            .send(SessionCommand::Call {
                action: "Reset".into(),
                payload: json!({"type": "Hard"}),
                reply,
            })
            .await
            .unwrap();
        assert!(outbound_rx.recv().await.is_some());

        drop(inbound_tx);
        task.await.unwrap();

        assert_eq!(
            outcome.await.unwrap(),
            Err(CallFailure::Abandoned(AbandonReason::Disconnected))
        );
        let stored: Option<Transaction> = store.find_transaction(transaction_id).await.unwrap();
        assert!(stored.unwrap().active);
    }
}

//! Session registry — the live sessions, keyed by charge point ID
//!
//! Other tasks use it to push outbound CALLs into a session's dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::pending::{AbandonReason, CallFailure, CallOutcome};

/// Requests delivered to a session's dispatcher loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a CALL to the charge point and report its outcome on `reply`.
    Call {
        action: String,
        payload: Value,
        reply: oneshot::Sender<CallOutcome>,
    },
    /// Stop the session (eviction or shutdown).
    Close,
}

/// Cloneable address of one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    charge_point_id: String,
    connection_id: u64,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Send a CALL and wait for its reply, timeout or abandonment.
    pub async fn call(&self, action: impl Into<String>, payload: Value) -> CallOutcome {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(SessionCommand::Call {
                action: action.into(),
                payload,
                reply,
            })
            .await
            .map_err(|_| CallFailure::NotConnected(self.charge_point_id.clone()))?;

        outcome
            .await
            .unwrap_or(Err(CallFailure::Abandoned(AbandonReason::Disconnected)))
    }

    /// Typed variant of [`call`](Self::call) using `rust-ocpp` request/response types.
    pub async fn call_typed<Req, Res>(&self, action: &str, request: &Req) -> Result<Res, CallFailure>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)
            .map_err(|e| CallFailure::SendFailed(format!("Serialization failed: {}", e)))?;
        let response = self.call(action, payload).await?;
        serde_json::from_value(response).map_err(|e| CallFailure::InvalidResponse(e.to_string()))
    }

    fn close(&self) {
        match self.commands.try_send(SessionCommand::Close) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    let _ = commands.send(SessionCommand::Close).await;
                });
            }
        }
    }
}

/// Thread-safe registry of active OCPP charge point sessions
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    next_connection_id: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a new connection. An older connection with the same charge
    /// point ID is told to close.
    pub fn register(
        &self,
        charge_point_id: &str,
        commands: mpsc::Sender<SessionCommand>,
    ) -> SessionHandle {
        let handle = SessionHandle {
            charge_point_id: charge_point_id.to_string(),
            connection_id: self.next_connection_id.fetch_add(1, Ordering::SeqCst),
            commands,
        };

        if let Some(previous) = self
            .sessions
            .insert(charge_point_id.to_string(), handle.clone())
        {
            warn!(
                charge_point_id,
                evicted_connection = previous.connection_id,
                "Charge point reconnected, evicting previous session"
            );
            previous.close();
        }

        info!(
            charge_point_id,
            connection_id = handle.connection_id,
            "Registering charge point session"
        );
        handle
    }

    /// Remove a session, but only if it is still the registered connection.
    pub fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, h| h.connection_id == connection_id)
            .is_some();
        if removed {
            info!(charge_point_id, connection_id, "Unregistered charge point session");
        }
        removed
    }

    pub fn get(&self, charge_point_id: &str) -> Option<SessionHandle> {
        self.sessions.get(charge_point_id).map(|h| h.clone())
    }

    /// Check if a charge point is currently connected
    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    /// Get all connected charge point IDs
    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Send a CALL to a connected charge point.
    pub async fn send_call(
        &self,
        charge_point_id: &str,
        action: impl Into<String>,
        payload: Value,
    ) -> CallOutcome {
        let handle = self
            .get(charge_point_id)
            .ok_or_else(|| CallFailure::NotConnected(charge_point_id.to_string()))?;
        handle.call(action, payload).await
    }

    /// Ask every live session to close.
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

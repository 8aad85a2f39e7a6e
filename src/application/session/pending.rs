//! Outbound calls waiting for the charge point's reply

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Timeout,
    Disconnected,
}

/// Why an outbound call produced no result payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallFailure {
    #[error("CallError {code}: {description}")]
    CallError {
        code: String,
        description: String,
        details: Value,
    },
    #[error("Call abandoned ({0:?})")]
    Abandoned(AbandonReason),
    #[error("Charge point not connected: {0}")]
    NotConnected(String),
    #[error("Failed to send: {0}")]
    SendFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type CallOutcome = Result<Value, CallFailure>;

struct PendingCall {
    action: String,
    reply: oneshot::Sender<CallOutcome>,
    submitted_at: Instant,
    deadline: Instant,
}

impl PendingCall {
    fn resolve(self, unique_id: &str, outcome: CallOutcome) {
        let elapsed_ms = self.submitted_at.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(message_id = unique_id, action = self.action.as_str(), elapsed_ms, "Call answered"),
            Err(failure) => warn!(
                message_id = unique_id,
                action = self.action.as_str(),
                elapsed_ms,
                %failure,
                "Call failed"
            ),
        }
        // The caller may have stopped waiting; the entry is resolved either way.
        let _ = self.reply.send(outcome);
    }
}

/// Table of CALLs this side sent and has not seen a reply for.
///
/// Every entry leaves the table exactly once, through one of the resolve,
/// expire or abandon paths, and its reply channel fires at that moment.
pub struct PendingCalls {
    calls: HashMap<String, PendingCall>,
    timeout: Duration,
}

impl PendingCalls {
    pub fn new(timeout: Duration) -> Self {
        Self {
            calls: HashMap::new(),
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Track a new outbound call. A `unique_id` that is still pending is
    /// refused and `reply` fires immediately with `SendFailed`.
    pub fn register(
        &mut self,
        unique_id: impl Into<String>,
        action: impl Into<String>,
        reply: oneshot::Sender<CallOutcome>,
    ) -> bool {
        let unique_id = unique_id.into();
        if self.calls.contains_key(&unique_id) {
            let _ = reply.send(Err(CallFailure::SendFailed(format!(
                "uniqueId {} is already pending",
                unique_id
            ))));
            return false;
        }
        let now = Instant::now();
        self.calls.insert(
            unique_id,
            PendingCall {
                action: action.into(),
                reply,
                submitted_at: now,
                deadline: now + self.timeout,
            },
        );
        true
    }

    /// Deliver a CALLRESULT. Returns `false` when nothing was waiting for it.
    pub fn resolve_result(&mut self, unique_id: &str, payload: Value) -> bool {
        match self.calls.remove(unique_id) {
            Some(call) => {
                call.resolve(unique_id, Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Deliver a CALLERROR. Returns `false` when nothing was waiting for it.
    pub fn resolve_error(
        &mut self,
        unique_id: &str,
        code: String,
        description: String,
        details: Value,
    ) -> bool {
        match self.calls.remove(unique_id) {
            Some(call) => {
                call.resolve(
                    unique_id,
                    Err(CallFailure::CallError {
                        code,
                        description,
                        details,
                    }),
                );
                true
            }
            None => false,
        }
    }

    /// Earliest deadline among pending calls.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.calls.values().map(|c| c.deadline).min()
    }

    /// Abandon every call whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for unique_id in &expired {
            if let Some(call) = self.calls.remove(unique_id) {
                call.resolve(unique_id, Err(CallFailure::Abandoned(AbandonReason::Timeout)));
            }
        }
        expired.len()
    }

    pub fn abandon_all(&mut self, reason: AbandonReason) -> usize {
        let count = self.calls.len();
        for (unique_id, call) in self.calls.drain() {
            call.resolve(&unique_id, Err(CallFailure::Abandoned(reason)));
        }
        count
    }
}

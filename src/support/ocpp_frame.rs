//! OCPP-J message framing
//!
//! Every OCPP-J message is a JSON array whose first element is the message type:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Parsing is strict: the element count must match the message type exactly and
//! payloads must be JSON objects. Payload contents are not inspected here; typed
//! validation belongs to the action registry.

use serde_json::{Map, Value};

use super::errors::{FrameError, FrameErrorKind};

// ── Message-type constants ─────────────────────────────────────

pub const MSG_TYPE_CALL: u64 = 2;
pub const MSG_TYPE_CALL_RESULT: u64 = 3;
pub const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse raw message text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FrameError::envelope(FrameErrorKind::InvalidJson(e.to_string())))?;

        let arr = match value {
            Value::Array(arr) => arr,
            _ => return Err(FrameError::envelope(FrameErrorKind::NotAnArray)),
        };

        let msg_type = arr
            .first()
            .ok_or_else(|| FrameError::envelope(FrameErrorKind::EmptyArray))?
            .as_u64();

        // The id is recovered before anything else is checked so that a
        // malformed call can still be answered with a CallError.
        let unique_id = arr
            .get(1)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let fail = |kind: FrameErrorKind| FrameError {
            unique_id: unique_id.clone(),
            kind,
        };

        let expected = match msg_type {
            Some(MSG_TYPE_CALL) => 4,
            Some(MSG_TYPE_CALL_RESULT) => 3,
            Some(MSG_TYPE_CALL_ERROR) => 5,
            Some(other) => return Err(fail(FrameErrorKind::UnknownMessageType(other))),
            None => return Err(fail(FrameErrorKind::InvalidMessageType)),
        };

        if arr.len() != expected {
            return Err(fail(FrameErrorKind::WrongArity {
                expected,
                got: arr.len(),
            }));
        }

        let Some(id) = unique_id.clone() else {
            return Err(fail(FrameErrorKind::InvalidUniqueId));
        };

        let mut elements = arr.into_iter().skip(2);
        let mut next = || elements.next().unwrap_or(Value::Null);

        match msg_type {
            Some(MSG_TYPE_CALL) => {
                let action = expect_string(next(), "action").map_err(fail)?;
                let payload = expect_object(next(), "payload").map_err(fail)?;
                Ok(Self::Call {
                    unique_id: id,
                    action,
                    payload,
                })
            }
            Some(MSG_TYPE_CALL_RESULT) => {
                let payload = expect_object(next(), "payload").map_err(fail)?;
                Ok(Self::CallResult {
                    unique_id: id,
                    payload,
                })
            }
            _ => {
                let error_code = expect_string(next(), "errorCode").map_err(fail)?;
                let error_description = expect_string(next(), "errorDescription").map_err(fail)?;
                let error_details = expect_object(next(), "errorDetails").map_err(fail)?;
                Ok(Self::CallError {
                    unique_id: id,
                    error_code,
                    error_description,
                    error_details,
                })
            }
        }
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to its wire text.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        arr.to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl ToString,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.to_string(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }

    /// Returns `true` if this is a `Call` frame.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    /// Returns `true` if this is a `CallResult` frame.
    pub fn is_call_result(&self) -> bool {
        matches!(self, Self::CallResult { .. })
    }

    /// Returns `true` if this is a `CallError` frame.
    pub fn is_call_error(&self) -> bool {
        matches!(self, Self::CallError { .. })
    }
}

/// `{}`, the payload of responses that carry no fields.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn expect_string(value: Value, field: &'static str) -> Result<String, FrameErrorKind> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(FrameErrorKind::FieldTypeMismatch(field)),
    }
}

fn expect_object(value: Value, field: &'static str) -> Result<Value, FrameErrorKind> {
    match value {
        Value::Object(_) => Ok(value),
        _ => Err(FrameErrorKind::FieldTypeMismatch(field)),
    }
}

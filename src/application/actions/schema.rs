//! Required-field checks run before a payload reaches its handler

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Array,
    Object,
    /// ISO-8601 date-time string
    Timestamp,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Timestamp => value
                .as_str()
                .is_some_and(|s| s.parse::<DateTime<Utc>>().is_ok()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Array => "an array",
            Self::Object => "an object",
            Self::Timestamp => "an ISO-8601 timestamp",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("Missing required field '{0}'")]
    Missing(&'static str),
    #[error("Field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: FieldKind,
    },
}

/// Required fields of one action's request, checked in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RequestSchema {
    required: Vec<(&'static str, FieldKind)>,
}

impl RequestSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: &'static str, kind: FieldKind) -> Self {
        self.required.push((field, kind));
        self
    }

    /// Fails on the first missing or mistyped field.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaViolation> {
        for &(field, kind) in &self.required {
            match payload.get(field) {
                None | Some(Value::Null) => return Err(SchemaViolation::Missing(field)),
                Some(value) if !kind.matches(value) => {
                    return Err(SchemaViolation::WrongType {
                        field,
                        expected: kind,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_schema() -> RequestSchema {
        RequestSchema::new()
            .require("connectorId", FieldKind::Integer)
            .require("idTag", FieldKind::String)
            .require("timestamp", FieldKind::Timestamp)
    }

    #[test]
    fn accepts_complete_payload() {
        let payload = json!({"connectorId": 1, "idTag": "T", "timestamp": "2024-01-01T00:00:00Z"});
        assert_eq!(start_schema().validate(&payload), Ok(()));
    }

    #[test]
    fn names_first_missing_field() {
        let payload = json!({"connectorId": 1});
        assert_eq!(
            start_schema().validate(&payload),
            Err(SchemaViolation::Missing("idTag"))
        );
    }

    #[test]
    fn rejects_wrong_kinds() {
        let payload = json!({"connectorId": "1", "idTag": "T", "timestamp": "2024-01-01T00:00:00Z"});
        let err = start_schema().validate(&payload).unwrap_err();
        assert_eq!(err.to_string(), "Field 'connectorId' must be an integer");

        let payload = json!({"connectorId": 1.5, "idTag": "T", "timestamp": "2024-01-01T00:00:00Z"});
        assert!(start_schema().validate(&payload).is_err());

        let payload = json!({"connectorId": 1, "idTag": "T", "timestamp": "yesterday"});
        assert_eq!(
            start_schema().validate(&payload),
            Err(SchemaViolation::WrongType {
                field: "timestamp",
                expected: FieldKind::Timestamp
            })
        );
    }
}

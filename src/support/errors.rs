use std::fmt;

use thiserror::Error;

// ── Framing ────────────────────────────────────────────────────

/// A message that could not be decoded as an OCPP-J frame.
///
/// `unique_id` is set when element 1 of the array was a non-empty string,
/// which is enough to address a `CallError` back to the sender.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FrameError {
    pub unique_id: Option<String>,
    pub kind: FrameErrorKind,
}

impl FrameError {
    /// An error where not even the envelope could be read.
    pub fn envelope(kind: FrameErrorKind) -> Self {
        Self {
            unique_id: None,
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameErrorKind {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected {expected} elements, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("uniqueId must be a non-empty string")]
    InvalidUniqueId,
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

// ── Protocol error codes ───────────────────────────────────────

/// OCPP 1.6-J `CallError` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurrenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        };
        write!(f, "{}", s)
    }
}

/// A call the central system refuses to process; rendered as a `CallError`.
#[derive(Debug, Clone, Error)]
#[error("{code}: {description}")]
pub struct CallRejection {
    pub code: ErrorCode,
    pub description: String,
}

impl CallRejection {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn formation(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::FormationViolation, description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, description)
    }
}

// ── Persistence ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store write task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed. Only lost or
    /// unobtainable connections qualify; constraint and query errors repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_))
                | Self::Unavailable(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Configuration / startup ────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

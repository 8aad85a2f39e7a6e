//! # OCPP Central System core
//!
//! OCPP 1.6-J central system for EV charging stations: frame codec, action
//! dispatch, per-connection session state and persistence.
//!
//! ## Architecture
//!
//! - **domain**: transaction entity and the [`domain::Store`] port
//! - **application**: action handlers, session state machine and dispatcher
//! - **infrastructure**: SQLite (SeaORM) and in-memory stores
//! - **interfaces**: the WebSocket server charge points connect to
//! - **support**: framing, errors, retry and shutdown plumbing

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::{init_database, open_storage, DatabaseConfig, DatabaseStorage};
pub use server::{init_tracing, ServerHandle, ServerOptions};

//! Infrastructure layer - storage backends

pub mod database;
pub mod storage;

pub use database::{init_database, open_storage, DatabaseConfig, DatabaseStorage};
pub use storage::{InMemoryStore, RetryingStore};

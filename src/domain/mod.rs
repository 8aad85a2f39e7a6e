//! Domain layer: transaction entity and the persistence port.

pub mod store;
pub mod transaction;

pub use store::{BootRecord, CloseOutcome, MeterReading, Store};
pub use transaction::{Transaction, TransactionIdGenerator};

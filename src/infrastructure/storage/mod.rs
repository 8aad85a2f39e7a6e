//! Store implementations

pub mod memory;
pub mod retrying;

pub use memory::InMemoryStore;
pub use retrying::RetryingStore;

//! Application layer: dispatch, session state machine and action handlers

pub mod actions;
pub mod dispatcher;
pub mod persistence;
pub mod session;

pub use actions::{ActionHandler, ActionRegistry, SessionServices};
pub use dispatcher::Dispatcher;
pub use persistence::{StoreWriter, WriteAck};
pub use session::{
    CallFailure, CallOutcome, Session, SessionCommand, SessionHandle, SessionRegistry,
    SharedSessionRegistry,
};

//! Interfaces layer - network-facing adapters

pub mod ws;

pub use ws::OcppServer;

//! WebSocket transport for charge point connections

pub mod ocpp_server;

pub use ocpp_server::OcppServer;

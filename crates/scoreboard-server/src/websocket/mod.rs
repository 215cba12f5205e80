//! WebSocket viewer connections: channel-backed handles and the session pump.

pub mod connection;
pub mod session;

//! # scoreboard-core
//!
//! Shared score state and snapshot fan-out, independent of any transport.
//!
//! - [`registry::Registry`]: participant scores and live connections behind one lock
//! - [`snapshot`]: deterministic, identity-ordered wire snapshots
//! - [`dispatcher::Dispatcher`]: push-on-write broadcast with per-connection isolation
//! - [`connection::ConnectionHandle`]: the seam a transport implements to receive snapshots
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testutil;

pub use connection::{ConnectionHandle, Delivery};
pub use dispatcher::{BroadcastReport, Dispatcher};
pub use errors::{RegisterError, SnapshotError};
pub use registry::Registry;
pub use snapshot::{ScoreBoard, Snapshot};

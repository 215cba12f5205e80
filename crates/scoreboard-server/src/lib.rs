//! # scoreboard-server
//!
//! Axum HTTP + `WebSocket` front for the score registry.
//!
//! - Score endpoints: `/add_participant`, `/increment_score`, `/remove_participant`
//! - `WebSocket` viewers at `/websocket?id=`: push-only snapshot stream with heartbeat
//! - Operational endpoints: `/health`, `/metrics`
//! - Static front-end bundle served for every other path
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

//! HTTP handlers for the score endpoints and the WebSocket upgrade.
//!
//! Each mutating handler applies its change, captures the caller's
//! snapshot, then runs a broadcast round. Broadcast failures never affect
//! the HTTP response.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use scoreboard_core::Snapshot;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::ServerError;
use crate::server::AppState;
use crate::websocket::session::{SessionSettings, ViewerSlot, release_slot, run_ws_session};

/// `?id=<identity>` query string.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    /// Participant identity.
    pub id: Option<String>,
}

impl IdQuery {
    /// The identity, rejecting an absent or empty `id`.
    pub fn into_id(self) -> Result<String, ServerError> {
        self.id
            .filter(|id| !id.is_empty())
            .ok_or(ServerError::MissingId)
    }
}

/// GET /add_participant
pub async fn add_participant(State(state): State<AppState>) -> Result<Response, ServerError> {
    let registry = state.registry();
    let id = registry.create_participant();
    let snapshot = registry.snapshot(&id);
    let _ = state.dispatcher.broadcast_all();
    snapshot_response(&snapshot)
}

/// GET /increment_score?id=
pub async fn increment_score(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ServerError> {
    let id = query.into_id()?;
    let registry = state.registry();
    let score = registry.increment_score(&id);
    let snapshot = registry.snapshot(&id);
    debug!(participant_id = %id, score, "increment applied");
    let _ = state.dispatcher.broadcast_all();
    snapshot_response(&snapshot)
}

/// GET /remove_participant?id=
pub async fn remove_participant(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ServerError> {
    let id = query.into_id()?;
    let registry = state.registry();
    if let Some(connection) = registry.remove_participant(&id) {
        connection.close();
    }
    let snapshot = registry.snapshot(&id);
    let _ = state.dispatcher.broadcast_all();
    snapshot_response(&snapshot)
}

/// GET /websocket?id=
///
/// Reserves a connection slot, then upgrades and hands the socket to a
/// viewer session. Refused or failed upgrades leave the registry as it was.
pub async fn websocket(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let participant_id = match query.into_id() {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(participant_id, error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let settings = SessionSettings::from(state.config.as_ref());
    let registry = state.registry().clone();
    let max = state.config.max_connections;
    let slot = match ViewerSlot::reserve(&registry, &participant_id, settings.outbound_buffer, max) {
        Ok(slot) => slot,
        Err(e) => {
            warn!(participant_id, error = %e, "refusing websocket");
            return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
        }
    };

    info!(participant_id, conn_id = %slot.connection().id, "websocket upgrade");
    let reserved = slot.connection().clone();
    let failed_id = participant_id.clone();
    let dispatcher = state.dispatcher.clone();
    let shutdown = state.shutdown.token();
    let coordinator = state.shutdown.clone();
    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!(participant_id = failed_id, error = %e, "websocket upgrade failed");
        release_slot(&registry, &failed_id, &reserved);
    })
    .on_upgrade(move |socket| {
        coordinator.track_session(run_ws_session(
            socket,
            participant_id,
            slot,
            dispatcher,
            settings,
            shutdown,
        ))
    })
}

fn snapshot_response(snapshot: &Snapshot) -> Result<Response, ServerError> {
    let body = snapshot.to_json()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

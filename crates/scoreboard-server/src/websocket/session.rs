//! WebSocket session lifecycle: one viewer from upgrade through disconnect.
//!
//! The channel is write-only from the server's side. Inbound text and
//! binary frames are read and discarded; they only count as liveness.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use scoreboard_core::ids::new_connection_id;
use scoreboard_core::{ConnectionHandle, Dispatcher, RegisterError, Registry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Timing and buffering for one session.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Silence tolerated before the viewer is considered dead.
    pub pong_timeout: Duration,
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
    /// Outbound queue depth.
    pub outbound_buffer: usize,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.heartbeat_interval(),
            pong_timeout: config.heartbeat_timeout(),
            send_timeout: config.send_timeout(),
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

/// A connection registered for a viewer before its upgrade completes.
///
/// Reserving in the handler lets the connection limit be enforced with a
/// 503 while the check and the insert stay atomic.
pub struct ViewerSlot {
    connection: Arc<ClientConnection>,
    send_rx: mpsc::Receiver<String>,
}

impl ViewerSlot {
    /// Register a fresh connection under `participant_id`, closing any
    /// connection it replaces.
    pub fn reserve(
        registry: &Registry,
        participant_id: &str,
        outbound_buffer: usize,
        max_connections: usize,
    ) -> Result<Self, RegisterError> {
        let (send_tx, send_rx) = mpsc::channel::<String>(outbound_buffer.max(1));
        let connection = Arc::new(ClientConnection::new(new_connection_id(), send_tx));
        if let Some(old) =
            registry.try_register_connection(participant_id, connection.clone(), max_connections)?
        {
            info!(
                participant_id,
                conn_id = %connection.id,
                old_conn_id = old.connection_id(),
                "closing replaced connection"
            );
            old.close();
        }
        Ok(Self {
            connection,
            send_rx,
        })
    }

    /// The reserved connection.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }
}

/// Undo a reservation whose upgrade never completed.
pub fn release_slot(registry: &Registry, participant_id: &str, connection: &ClientConnection) {
    connection.close();
    let _ = registry.connection_closed(participant_id, &connection.id);
}

/// Run a WebSocket session for a viewer registered under `participant_id`.
///
/// 1. Broadcasts so the new viewer gets the current state
/// 2. Forwards queued snapshots to the socket, each write bounded by `send_timeout`
/// 3. Sends periodic Pings and disconnects unresponsive viewers
/// 4. Deregisters on disconnect, write failure, close request or shutdown
#[instrument(skip_all, fields(participant_id = %participant_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    participant_id: String,
    slot: ViewerSlot,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let ViewerSlot {
        connection,
        send_rx,
    } = slot;
    let conn_id = connection.id.clone();

    info!(conn_id, "viewer connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let registry = dispatcher.registry();
    let _ = dispatcher.broadcast_all();

    let mut outbound = tokio::spawn(pump_outbound(
        ws_tx,
        send_rx,
        connection.clone(),
        settings,
        shutdown,
    ));

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) => {
                    info!(conn_id, "viewer sent close frame");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.mark_alive(),
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    connection.mark_alive();
                    debug!(conn_id, "ignoring inbound frame");
                }
                Some(Err(e)) => {
                    debug!(conn_id, error = %e, "websocket read failed");
                    break;
                }
                None => break,
            },
            _ = &mut outbound => break,
        }
    }

    // Clean up
    connection.close();
    outbound.abort();
    let evicted = registry.connection_closed(&participant_id, &conn_id);
    info!(conn_id, evicted, "viewer disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Write queued snapshots and Pings until the peer fails, goes silent, or
/// the server asks the connection to close.
async fn pump_outbound<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<String>,
    connection: Arc<ClientConnection>,
    settings: SessionSettings,
    shutdown: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let closed = connection.closed_token();
    let mut ping_interval = tokio::time::interval(settings.ping_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if !send_frame(&mut ws_tx, Message::Text(text.into()), settings.send_timeout).await {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if connection.heartbeat_expired(settings.pong_timeout) {
                    warn!(conn_id = %connection.id, "viewer unresponsive for {:?}, disconnecting", settings.pong_timeout);
                    break;
                }
                if !send_frame(&mut ws_tx, Message::Ping(Vec::new().into()), settings.send_timeout).await {
                    break;
                }
            }
            () = closed.cancelled() => {
                let _ = send_frame(&mut ws_tx, close_message("closed by server"), settings.send_timeout).await;
                break;
            }
            () = shutdown.cancelled() => {
                let _ = send_frame(&mut ws_tx, close_message("server shutting down"), settings.send_timeout).await;
                break;
            }
        }
    }
}

/// Send one frame, bounded by `limit`. Returns `false` if the socket is unusable.
async fn send_frame<S>(ws_tx: &mut S, message: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, ws_tx.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "websocket write failed");
            false
        }
        Err(_) => {
            warn!(timeout = ?limit, "websocket write timed out");
            false
        }
    }
}

fn close_message(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: reason.into(),
    }))
}

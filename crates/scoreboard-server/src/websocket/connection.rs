//! WebSocket viewer connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use scoreboard_core::{ConnectionHandle, Delivery};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A connected viewer. Snapshots are queued here and written out by the
/// session's outbound task.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the viewer's WebSocket write task.
    tx: mpsc::Sender<String>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the viewer has responded since the last ping check.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of snapshots dropped due to a full channel.
    pub dropped_messages: AtomicU64,
    /// Version of the newest snapshot enqueued.
    last_version: Mutex<Option<u64>>,
    /// Cancelled when the server wants this connection gone.
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            last_version: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Token cancelled by [`ConnectionHandle::close`].
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Heartbeat verdict for one ping tick.
    ///
    /// Expired when nothing arrived since the previous tick and the last
    /// activity is older than `timeout`. Resets the alive flag.
    pub fn heartbeat_expired(&self, timeout: Duration) -> bool {
        !self.check_alive() && self.last_pong_elapsed() > timeout
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl ConnectionHandle for ClientConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn deliver(&self, version: u64, payload: String) -> Delivery {
        // Held across try_send so overlapping rounds enqueue in version order.
        let mut last = self.last_version.lock();
        if last.is_some_and(|v| version < v) {
            return Delivery::Stale;
        }
        if self.closed.is_cancelled() {
            return Delivery::Closed;
        }
        match self.tx.try_send(payload) {
            Ok(()) => {
                *last = Some(version);
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

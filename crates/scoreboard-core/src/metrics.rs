//! Metric names shared by the engine and the server.

/// Participants created (counter).
pub const PARTICIPANTS_CREATED_TOTAL: &str = "participants_created_total";
/// Participants removed (counter).
pub const PARTICIPANTS_REMOVED_TOTAL: &str = "participants_removed_total";
/// Score increments applied (counter).
pub const SCORE_INCREMENTS_TOTAL: &str = "score_increments_total";
/// Broadcast rounds run (counter).
pub const BROADCAST_ROUNDS_TOTAL: &str = "broadcast_rounds_total";
/// Snapshots enqueued to connections (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Snapshots dropped on a full queue (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Connections evicted by the dispatcher (counter).
pub const BROADCAST_EVICTIONS_TOTAL: &str = "broadcast_evictions_total";
/// Snapshots that failed to serialize (counter).
pub const BROADCAST_FAILURES_TOTAL: &str = "broadcast_failures_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

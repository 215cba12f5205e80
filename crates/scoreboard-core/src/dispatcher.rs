//! Push-on-write fan-out of score snapshots to every registered connection.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::connection::Delivery;
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, BROADCAST_DROPS_TOTAL, BROADCAST_EVICTIONS_TOTAL,
    BROADCAST_FAILURES_TOTAL, BROADCAST_ROUNDS_TOTAL,
};
use crate::registry::Registry;

/// Default number of full-queue drops before a slow connection is evicted.
pub const DEFAULT_MAX_SLOW_DROPS: u64 = 32;

/// Per-round delivery tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Registry version the round was captured at.
    pub version: u64,
    /// Connections the round was addressed to.
    pub recipients: usize,
    /// Snapshots enqueued.
    pub delivered: usize,
    /// Snapshots skipped because the connection already had a newer one.
    pub stale: usize,
    /// Snapshots dropped on a full queue.
    pub dropped: usize,
    /// Connections removed from the registry during the round.
    pub evicted: usize,
    /// Snapshots that failed to serialize.
    pub failed: usize,
}

/// Broadcasts the registry's state to all of its connections.
pub struct Dispatcher {
    registry: Arc<Registry>,
    max_slow_drops: u64,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<Registry>, max_slow_drops: u64) -> Self {
        Self {
            registry,
            max_slow_drops: max_slow_drops.max(1),
        }
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run one broadcast round.
    ///
    /// Scores and targets are captured under a single read lock, which is
    /// released before any delivery. A failure on one connection is logged
    /// and never stops delivery to the rest. Closed connections, and
    /// connections that keep overflowing, are evicted and closed.
    pub fn broadcast_all(&self) -> BroadcastReport {
        let round = self.registry.broadcast_round();
        let version = round.board.version();
        let mut report = BroadcastReport {
            version,
            recipients: round.targets.len(),
            ..BroadcastReport::default()
        };

        for (id, conn) in round.targets {
            let payload = match round.board.snapshot_for(&id).to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(participant_id = %id, error = %e, "failed to serialize snapshot");
                    report.failed += 1;
                    continue;
                }
            };

            match conn.deliver(version, payload) {
                Delivery::Sent => report.delivered += 1,
                Delivery::Stale => {
                    debug!(participant_id = %id, conn_id = conn.connection_id(), version, "skipped stale snapshot");
                    report.stale += 1;
                }
                Delivery::Dropped => {
                    report.dropped += 1;
                    let drops = conn.drop_count();
                    if drops >= self.max_slow_drops {
                        warn!(participant_id = %id, conn_id = conn.connection_id(), drops, "evicting slow connection");
                        if self.registry.connection_closed(&id, conn.connection_id()) {
                            report.evicted += 1;
                        }
                        conn.close();
                    } else {
                        warn!(participant_id = %id, conn_id = conn.connection_id(), total_drops = drops, "failed to send snapshot (queue full)");
                    }
                }
                Delivery::Closed => {
                    warn!(participant_id = %id, conn_id = conn.connection_id(), "connection closed, evicting");
                    if self.registry.connection_closed(&id, conn.connection_id()) {
                        report.evicted += 1;
                    }
                }
            }
        }

        counter!(BROADCAST_ROUNDS_TOTAL).increment(1);
        counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        counter!(BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
        counter!(BROADCAST_EVICTIONS_TOTAL).increment(report.evicted as u64);
        counter!(BROADCAST_FAILURES_TOTAL).increment(report.failed as u64);
        debug!(
            version,
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast round"
        );
        report
    }
}

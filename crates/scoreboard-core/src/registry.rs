//! Participant registry: scores and live connections behind one lock.
//!
//! Both maps live in a single [`RegistryState`] guarded by one
//! `parking_lot::RwLock`, so a reader never sees one map updated and the
//! other not. Every score mutation advances `version`; broadcast rounds
//! carry the version they were captured at.
//!
//! The lock is never held across an `.await` or a connection write.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::errors::RegisterError;
use crate::ids::new_participant_id;
use crate::metrics::{PARTICIPANTS_CREATED_TOTAL, PARTICIPANTS_REMOVED_TOTAL, SCORE_INCREMENTS_TOTAL};
use crate::snapshot::{ScoreBoard, Snapshot};

/// Everything a broadcast round needs, captured under one read lock.
pub struct BroadcastRound {
    /// Scores at capture time.
    pub board: ScoreBoard,
    /// `(identity, connection)` pairs registered at capture time.
    pub targets: Vec<(String, Arc<dyn ConnectionHandle>)>,
}

#[derive(Default)]
struct RegistryState {
    /// Identity → score. Ordered so snapshots come out sorted by identity.
    scores: BTreeMap<String, u64>,
    /// Identity → the one live connection retained for it.
    connections: HashMap<String, Arc<dyn ConnectionHandle>>,
    /// Bumped on every score mutation.
    version: u64,
}

/// Process-wide participant state. Construct once and share behind an `Arc`.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh identity with score 0.
    pub fn create_participant(&self) -> String {
        let id = new_participant_id();
        {
            let mut state = self.state.write();
            let _ = state.scores.insert(id.clone(), 0);
            state.version += 1;
        }
        counter!(PARTICIPANTS_CREATED_TOTAL).increment(1);
        info!(participant_id = %id, "participant created");
        id
    }

    /// Associate a delivery channel with `id`, replacing any earlier one.
    ///
    /// The identity is not checked against the score map. The displaced
    /// handle, if any, is returned so the caller can close it.
    pub fn register_connection(
        &self,
        id: &str,
        connection: Arc<dyn ConnectionHandle>,
    ) -> Option<Arc<dyn ConnectionHandle>> {
        let conn_id = connection.connection_id().to_owned();
        let displaced = self
            .state
            .write()
            .connections
            .insert(id.to_owned(), connection);
        info!(
            participant_id = id,
            conn_id,
            replaced = displaced.is_some(),
            "connection registered"
        );
        displaced
    }

    /// Like [`register_connection`](Self::register_connection), but refuses
    /// a new identity once `max` connections are registered.
    ///
    /// The check and the insert happen under one write lock. Replacing the
    /// connection of an identity that already has one never counts against
    /// the limit.
    pub fn try_register_connection(
        &self,
        id: &str,
        connection: Arc<dyn ConnectionHandle>,
        max: usize,
    ) -> Result<Option<Arc<dyn ConnectionHandle>>, RegisterError> {
        let conn_id = connection.connection_id().to_owned();
        let displaced = {
            let mut state = self.state.write();
            if !state.connections.contains_key(id) && state.connections.len() >= max {
                return Err(RegisterError::AtCapacity { max });
            }
            state.connections.insert(id.to_owned(), connection)
        };
        info!(
            participant_id = id,
            conn_id,
            replaced = displaced.is_some(),
            "connection registered"
        );
        Ok(displaced)
    }

    /// Delete `id` from both maps. Unknown identities are a no-op.
    ///
    /// Returns the connection that was registered for `id`, if any.
    pub fn remove_participant(&self, id: &str) -> Option<Arc<dyn ConnectionHandle>> {
        let (existed, connection) = {
            let mut state = self.state.write();
            let existed = state.scores.remove(id).is_some();
            let connection = state.connections.remove(id);
            if existed {
                state.version += 1;
            }
            (existed, connection)
        };
        if existed {
            counter!(PARTICIPANTS_REMOVED_TOTAL).increment(1);
            info!(participant_id = id, "participant removed");
        } else {
            debug!(participant_id = id, "remove of unknown participant ignored");
        }
        connection
    }

    /// Add 1 to `id`'s score and return the new value.
    ///
    /// An unknown identity is created implicitly and ends at 1.
    pub fn increment_score(&self, id: &str) -> u64 {
        let score = {
            let mut state = self.state.write();
            let entry = state.scores.entry(id.to_owned()).or_insert(0);
            *entry += 1;
            let score = *entry;
            state.version += 1;
            score
        };
        counter!(SCORE_INCREMENTS_TOTAL).increment(1);
        debug!(participant_id = id, score, "score incremented");
        score
    }

    /// Close hook: evict `id`'s connection if it is still `connection_id`.
    ///
    /// Returns `true` if an entry was removed. A connection that was already
    /// replaced leaves its successor in place.
    pub fn connection_closed(&self, id: &str, connection_id: &str) -> bool {
        let mut state = self.state.write();
        let matches = state
            .connections
            .get(id)
            .is_some_and(|c| c.connection_id() == connection_id);
        if matches {
            let _ = state.connections.remove(id);
        }
        matches
    }

    /// The snapshot addressed to `id`.
    pub fn snapshot(&self, id: &str) -> Snapshot {
        self.board().snapshot_for(id)
    }

    /// A point-in-time copy of all scores.
    pub fn board(&self) -> ScoreBoard {
        let state = self.state.read();
        ScoreBoard::capture(state.version, &state.scores)
    }

    /// Scores and the connection list, consistent with each other.
    pub fn broadcast_round(&self) -> BroadcastRound {
        let state = self.state.read();
        BroadcastRound {
            board: ScoreBoard::capture(state.version, &state.scores),
            targets: state
                .connections
                .iter()
                .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
                .collect(),
        }
    }

    /// Current score for `id`, if known.
    pub fn score(&self, id: &str) -> Option<u64> {
        self.state.read().scores.get(id).copied()
    }

    /// Number of known participants.
    pub fn participant_count(&self) -> usize {
        self.state.read().scores.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Current mutation version.
    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

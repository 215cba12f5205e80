//! Snapshot serialization.
//!
//! A [`ScoreBoard`] is a point-in-time copy of every score, ordered by
//! ascending identity string. One board is captured per broadcast round and
//! every recipient's [`Snapshot`] is cut from it, so all recipients of a
//! round see element-wise identical `Points`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::SnapshotError;

/// Wire message: the recipient's own identity plus all scores.
///
/// Serializes as `{"Id": "...", "Points": [..]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Snapshot {
    /// Identity of the recipient.
    pub id: String,
    /// One score per known participant, ordered by ascending identity.
    pub points: Vec<u64>,
}

impl Snapshot {
    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|source| SnapshotError::Serialize {
            id: self.id.clone(),
            source,
        })
    }
}

/// Scores captured at one registry version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    version: u64,
    points: Vec<u64>,
}

impl ScoreBoard {
    /// Copy the score map. `BTreeMap` iteration already yields ascending keys.
    pub fn capture(version: u64, scores: &BTreeMap<String, u64>) -> Self {
        Self {
            version,
            points: scores.values().copied().collect(),
        }
    }

    /// Registry version the board was captured at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Ordered scores.
    pub fn points(&self) -> &[u64] {
        &self.points
    }

    /// Tag the board with a recipient.
    pub fn snapshot_for(&self, id: &str) -> Snapshot {
        Snapshot {
            id: id.to_owned(),
            points: self.points.clone(),
        }
    }
}

//! Identifier generation.

use uuid::Uuid;

/// A fresh participant identity. Random (UUID v4), never reused within a process.
pub fn new_participant_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh connection identity, used to tell a live connection from the one it replaced.
pub fn new_connection_id() -> String {
    format!("conn_{}", Uuid::new_v4().simple())
}

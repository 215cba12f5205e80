//! Error types for the score engine.

/// Failure to turn a snapshot into its wire form.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// JSON encoding failed.
    #[error("failed to serialize snapshot for '{id}': {source}")]
    Serialize {
        /// Recipient the snapshot was addressed to.
        id: String,
        /// Underlying encoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to register a connection.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// Every connection slot is taken by another identity.
    #[error("connection limit of {max} reached")]
    AtCapacity {
        /// Configured limit.
        max: usize,
    },
}

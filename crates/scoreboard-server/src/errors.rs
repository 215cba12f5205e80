//! Server error types.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scoreboard_core::SnapshotError;
use tracing::{debug, error};

/// Errors surfaced by the HTTP layer and server startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A response snapshot could not be encoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The `id` query parameter is absent or empty.
    #[error("missing or empty 'id' query parameter")]
    MissingId,

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingId => StatusCode::BAD_REQUEST,
            Self::Snapshot(_) | Self::Bind { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Errors loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid config JSON.
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

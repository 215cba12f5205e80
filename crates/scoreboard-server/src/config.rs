//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scoreboard_core::dispatcher::DEFAULT_MAX_SLOW_DROPS;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Configuration for the scoreboard server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Directory served for unrouted paths (the front-end bundle).
    pub static_dir: PathBuf,
    /// Maximum concurrent WebSocket viewers.
    pub max_connections: usize,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Upper bound on a single WebSocket frame write, in milliseconds.
    pub send_timeout_ms: u64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a viewer silent for longer than this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Full-queue drops tolerated before a slow viewer is evicted.
    pub max_slow_drops: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            static_dir: PathBuf::from("./static"),
            max_connections: 256,
            outbound_buffer: 64,
            send_timeout_ms: 5_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_slow_drops: DEFAULT_MAX_SLOW_DROPS,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Frame write bound.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }

    /// Interval between server Pings.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Silence tolerated before disconnect.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }
}

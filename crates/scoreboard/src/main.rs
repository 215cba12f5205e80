//! # scoreboard
//!
//! Scoreboard server binary. Parses the command line, installs logging and
//! metrics, then serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use scoreboard_core::logging::{self, LogFormat};
use scoreboard_server::config::ServerConfig;
use scoreboard_server::server::ScoreServer;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8888;

/// Live scoreboard server.
#[derive(Parser, Debug)]
#[command(name = "scoreboard", about = "Live scoreboard server")]
struct Cli {
    /// Host to bind [default: 0.0.0.0].
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign [default: 8888].
    #[arg(long)]
    port: Option<u16>,

    /// Directory served for unmatched paths.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// JSON config file. Flags given on the command line override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format (`compact` or `json`).
    #[arg(long, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                ..ServerConfig::default()
            },
        };
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir.clone_from(dir);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_subscriber(&cli.log_level, cli.log_format);

    let config = cli.server_config()?;
    let metrics_handle = scoreboard_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = ScoreServer::new(config, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        static_dir = %server.config().static_dir.display(),
        "scoreboard listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["scoreboard"]);
        assert_eq!(cli.host, None);
        assert_eq!(cli.port, None);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn default_config_binds_port_8888() {
        let config = Cli::parse_from(["scoreboard"]).server_config().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8888);
        assert_eq!(config.static_dir, ServerConfig::default().static_dir);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "scoreboard",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--static-dir",
            "/srv/board",
        ]);
        let config = cli.server_config().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.static_dir, PathBuf::from("/srv/board"));
    }

    #[test]
    fn cli_json_log_format() {
        let cli = Cli::parse_from(["scoreboard", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["scoreboard", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn config_file_values_are_overridden_by_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": "10.0.0.1", "port": 7000, "max_connections": 4}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from(["scoreboard", "--config", &path, "--port", "7001"]);
        let config = cli.server_config().unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 7001);
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["scoreboard", "--config", "/nonexistent/scoreboard.json"]);
        assert!(cli.server_config().is_err());
    }
}

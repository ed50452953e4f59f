//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` but can be set via the
//! `-f` flag or the `BIGUP_CONFIG` environment variable. Variables prefixed
//! with `BIGUP_` override YAML values, e.g. `BIGUP_RESULTS_DIR=/tmp/reports`
//! or `BIGUP_PORT=5001`.
//!
//! The configuration is resolved once at startup and passed explicitly to the
//! components that need it; there is no global mutable state.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "BIGUP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where profiling reports are written
    pub results_dir: PathBuf,
    /// Where persisted uploads land (one uniquely named file per request)
    pub downloads_dir: PathBuf,
    /// Default downstream target (host:port) for the relay endpoint
    pub default_next: String,
    /// Maximum accepted request body size in bytes
    pub max_upload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            results_dir: PathBuf::from("benchmark"),
            downloads_dir: PathBuf::from("downloads"),
            default_next: "localhost:5001".to_string(),
            max_upload_size: 2 * 1024 * 1024 * 1024, // 2 GiB
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("BIGUP_"))
            .extract()
    }

    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

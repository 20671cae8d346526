//! Host configuration: an optional JSON file overridden by CLI flags and
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use hall::HallConfig;
use serde::{Deserialize, Serialize};

use crate::ServerError;

/// Settings of the host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// WebSocket URL of the user service.
    pub user_service_url: String,
    /// Secret shared with the user service for `getUserInfo` keys.
    pub secret: String,
    /// Timeout of one user-service call, in milliseconds.
    pub user_service_timeout_ms: u64,
    /// Time a client gets to complete the WebSocket upgrade after its TCP
    /// connection is accepted, in milliseconds.
    pub handshake_timeout_ms: u64,
    pub hall: HallConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3010".to_string(),
            user_service_url: "ws://127.0.0.1:3020".to_string(),
            secret: String::new(),
            user_service_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            hall: HallConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Normalises the nested hall settings and rejects an empty bind
    /// address or user-service URL.
    pub fn validated(mut self) -> Result<Self, ServerError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ServerError::InvalidConfig("bind_addr can't be empty".into()));
        }
        if self.user_service_url.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "user_service_url can't be empty".into(),
            ));
        }
        if self.secret.is_empty() {
            tracing::warn!("no secret configured, getUserInfo keys use an empty key");
        }
        if self.user_service_timeout_ms == 0 {
            self.user_service_timeout_ms = Self::default().user_service_timeout_ms;
        }
        if self.handshake_timeout_ms == 0 {
            self.handshake_timeout_ms = Self::default().handshake_timeout_ms;
        }
        self.hall = self.hall.validated();
        Ok(self)
    }

    pub fn user_service_timeout(&self) -> Duration {
        Duration::from_millis(self.user_service_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Command line of the `hall-server` binary.
#[derive(Parser, Debug, Default)]
#[command(name = "hall-server", version, about = "Lobby service of the game backend")]
pub struct Cli {
    #[arg(
        long,
        env = "HALL_CONFIG",
        value_name = "config",
        help = "Path to a JSON config file. Flags below override its values."
    )]
    pub config: Option<PathBuf>,

    #[arg(long, env = "HALL_BIND", value_name = "addr", help = "Address to listen on")]
    pub bind: Option<String>,

    #[arg(
        long,
        env = "HALL_USER_SERVICE",
        value_name = "url",
        help = "WebSocket URL of the user service"
    )]
    pub user_service: Option<String>,

    #[arg(
        long,
        env = "HALL_SECRET",
        value_name = "secret",
        hide_env_values = true,
        help = "Secret shared with the user service"
    )]
    pub secret: Option<String>,

    #[arg(long, help = "Log at debug level when RUST_LOG is not set")]
    pub debug: bool,
}

impl Cli {
    /// Loads the config file, if any, applies the overrides and validates
    /// the result.
    pub fn load_config(&self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(url) = &self.user_service {
            config.user_service_url = url.clone();
        }
        if let Some(secret) = &self.secret {
            config.secret = secret.clone();
        }
        config.validated()
    }
}

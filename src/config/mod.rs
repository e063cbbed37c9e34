//! Configuration management

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub matchmaking: MatchmakingConfig,
}

/// Server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket directory
    pub runtime_dir: Option<PathBuf>,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Lower bound of the randomized search delay, in milliseconds
    pub search_delay_min_ms: u64,

    /// Upper bound of the randomized search delay, in milliseconds
    pub search_delay_max_ms: u64,

    /// Concurrent sessions a single moderator may carry
    pub moderator_capacity: u32,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            search_delay_min_ms: 3000,
            search_delay_max_ms: 7200,
            moderator_capacity: 100,
        }
    }
}

impl Config {
    /// Load config from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("matchline")
            .join("config.toml")
    }

    /// Get the runtime directory for sockets
    pub fn runtime_dir(&self) -> PathBuf {
        self.server
            .runtime_dir
            .clone()
            .or_else(dirs::runtime_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("matchline")
    }

    /// Get the server socket path
    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir().join("matchline.sock")
    }
}

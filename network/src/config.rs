// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client configuration, loaded from a TOML file under the platform
//! config directory and created with defaults on first run.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use wordbattle_core::BattleConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay base URL (http scheme; the websocket URL is derived)
    pub relay_url: String,
    #[serde(default = "default_winning_score")]
    pub winning_score: u32,
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u8,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,
}

fn default_winning_score() -> u32 {
    10
}

fn default_countdown_seconds() -> u8 {
    3
}

fn default_stall_timeout_ms() -> u64 {
    5_000
}

fn default_advance_delay_ms() -> u64 {
    200
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8000".to_string(),
            winning_score: default_winning_score(),
            countdown_seconds: default_countdown_seconds(),
            stall_timeout_ms: default_stall_timeout_ms(),
            advance_delay_ms: default_advance_delay_ms(),
        }
    }
}

impl ClientConfig {
    /// Battle parameters for a session under this config.
    pub fn battle(&self) -> BattleConfig {
        BattleConfig {
            winning_score: self.winning_score,
            countdown_from: self.countdown_seconds,
            advance_delay: Duration::from_millis(self.advance_delay_ms),
            stall_timeout: Duration::from_millis(self.stall_timeout_ms),
        }
    }

    /// WebSocket base derived from the relay URL.
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.relay_url.strip_prefix("https") {
            format!("wss{rest}")
        } else if let Some(rest) = self.relay_url.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            self.relay_url.clone()
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("io", "wordbattle", "wordbattle")
        .context("Failed to determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

pub fn load_config() -> Result<ClientConfig> {
    let config_path = get_config_path().context("Failed to determine config path")?;

    if !config_path.exists() {
        tracing::info!("Config file not found, creating default at: {}", config_path.display());

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = ClientConfig::default();
        let toml_content =
            toml::to_string_pretty(&default_config).context("Failed to serialize default config")?;
        fs::write(&config_path, toml_content).context("Failed to write default config file")?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let config: ClientConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_swaps_scheme() {
        let mut config = ClientConfig::default();
        assert_eq!(config.ws_base(), "ws://127.0.0.1:8000");
        config.relay_url = "https://relay.example.com".to_string();
        assert_eq!(config.ws_base(), "wss://relay.example.com");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ClientConfig = toml::from_str("relay_url = \"http://localhost:9000\"").unwrap();
        assert_eq!(config.winning_score, 10);
        assert_eq!(config.battle().stall_timeout, Duration::from_secs(5));
    }
}

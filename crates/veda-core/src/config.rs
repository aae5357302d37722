use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow, bail};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const SERVER_URL_ENV: &str = "VEDA_SERVER_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    /// Explicit channel endpoint; derived from `server_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
    pub suggestions_refresh_secs: u64,
    pub max_command_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_url: None,
            max_reconnect_attempts: 5,
            reconnect_delay_secs: 2,
            suggestions_refresh_secs: 300,
            max_command_chars: 500,
        }
    }

    /// Load from the user config directory, then apply `VEDA_SERVER_URL`.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.override_server_url(url.trim());
            }
        }
        Ok(config)
    }

    /// Point at another backend. A channel endpoint pinned for the old
    /// backend is dropped so the channel follows the new host.
    pub fn override_server_url(&mut self, url: &str) {
        self.server_url = url.to_string();
        self.ws_url = None;
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.suggestions_refresh_secs == 0 {
            bail!("suggestions_refresh_secs must be at least 1");
        }
        if self.reconnect_delay_secs == 0 {
            bail!("reconnect_delay_secs must be at least 1");
        }
        if self.max_command_chars == 0 {
            bail!("max_command_chars must be at least 1");
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Channel endpoint: `ws_url` if set, else `server_url` with a ws scheme
    /// and `/ws` path.
    pub fn channel_url(&self) -> String {
        if let Some(url) = self.ws_url.as_ref().filter(|u| !u.is_empty()) {
            return url.clone();
        }
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", base)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn suggestions_refresh(&self) -> Duration {
        // interval timers panic on a zero period
        Duration::from_secs(self.suggestions_refresh_secs.max(1))
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("veda").join("config.json"))
    }
}

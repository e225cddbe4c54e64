use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::bilibili::StreamerInfo;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub webhook: WebhookConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub streamers: Vec<StreamerInfo>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// 6-field cron expression for the check cycle, e.g. "0 */2 * * * *"
    pub check_interval: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        port: default_port(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.webhook.url.trim().is_empty() {
            bail!("webhook.url must not be empty");
        }
        if self.streamers.is_empty() {
            bail!("at least one [[streamers]] entry is required");
        }
        for streamer in &self.streamers {
            if streamer.uid == 0 || streamer.name.trim().is_empty() || streamer.room_id == 0 {
                bail!(
                    "incomplete streamer entry: uid={}, name={:?}, room_id={}",
                    streamer.uid,
                    streamer.name,
                    streamer.room_id
                );
            }
        }
        if self.monitor.check_interval.trim().is_empty() {
            bail!("monitor.check_interval must not be empty");
        }
        Ok(())
    }
}

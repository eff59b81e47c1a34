//! setgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetgridConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Deadline applied to the primary write of every API call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Allow-lists that setting channels and clients are validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_clients")]
    pub clients: Vec<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            clients: default_clients(),
        }
    }
}

/// Background status-counter maintenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_port() -> u16 {
    8480
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/setgrid")
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_channels() -> Vec<String> {
    ["stable", "beta", "dev"].iter().map(|s| s.to_string()).collect()
}

fn default_clients() -> Vec<String> {
    ["web", "ios", "android"].iter().map(|s| s.to_string()).collect()
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

impl SetgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SetgridConfig = toml::from_str(content)?;
        if config.status.workers == 0 {
            anyhow::bail!("status.workers must be at least 1");
        }
        if config.status.queue_capacity == 0 {
            anyhow::bail!("status.queue_capacity must be at least 1");
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = SetgridConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8480);
        assert_eq!(config.status.workers, 2);
        assert_eq!(config.settings.channels, vec!["stable", "beta", "dev"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SetgridConfig::from_toml_str(
            r#"
[settings]
clients = ["web"]

[status]
queue_capacity = 16
"#,
        )
        .unwrap();
        assert_eq!(config.settings.clients, vec!["web"]);
        assert_eq!(config.settings.channels.len(), 3);
        assert_eq!(config.status.queue_capacity, 16);
        assert_eq!(config.status.workers, 2);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = SetgridConfig::from_toml_str("[status]\nworkers = 0\n").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setgrid.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = SetgridConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout_ms, 5000);
    }

    #[test]
    fn round_trips_through_toml() {
        let toml_str = SetgridConfig::default().to_toml_string().unwrap();
        assert!(toml_str.contains("queue_capacity"));
        let back = SetgridConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(back.server.port, 8480);
    }
}

//! Layered server configuration: embedded defaults, optional user file,
//! command-line overrides applied by `main`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("default server config to parse")
    }
}

impl ServerConfig {
    /// Defaults, with `path`'s contents merged over them when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let user: Self = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            config.merge(user);
        }
        Ok(config)
    }

    fn merge(&mut self, other: Self) {
        self.http = other.http;
        self.relay = other.relay;
        self.remote = other.remote;
        self.upload = other.upload;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub chunk_size: usize,
    pub timeout_secs: Option<u64>,
}

impl RelayConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: graymill_core::DEFAULT_CHUNK_SIZE,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub tls: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:50051".to_string(),
            tls: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: Option<PathBuf>,
}

impl UploadConfig {
    /// Directory upload temp files land in.
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = ServerConfig::default();
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.relay.chunk_size, 65536);
        assert_eq!(config.relay.timeout(), None);
        assert_eq!(config.remote.endpoint, "http://localhost:50051");
        assert!(!config.remote.tls);
        assert!(config.upload.dir.is_none());
    }

    #[test]
    fn partial_user_config_fills_missing_sections() {
        let user: ServerConfig = toml::from_str(
            r#"
            [remote]
            endpoint = "https://filter.internal:443"
            tls = true

            [relay]
            chunk_size = 32768
            timeout_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(user.remote.endpoint, "https://filter.internal:443");
        assert!(user.remote.tls);
        assert_eq!(user.relay.chunk_size, 32768);
        assert_eq!(user.relay.timeout(), Some(Duration::from_secs(120)));
        // untouched sections keep defaults
        assert_eq!(user.http.port, 3000);
    }
}

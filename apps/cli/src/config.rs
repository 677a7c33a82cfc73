//! Client configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunkflow/config.toml`
//! - Windows: `%APPDATA%/chunkflow/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkflow_notify::NotifyConfig;
use chunkflow_transfer::DEFAULT_CHUNK_SIZE;
use chunkflow_uploader::{HttpServiceConfig, UploaderConfig};
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the upload API.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Owner used when `--owner` is not given.
    #[serde(default)]
    pub owner_id: Option<i64>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff unit between chunk retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_true")]
    pub verify_integrity: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Notification endpoints; derived from `server_url` when empty.
    #[serde(default)]
    pub notify_endpoints: Vec<String>,
}

fn default_server_url() -> String {
    "http://localhost:8080/api".into()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_concurrency() -> usize {
    3
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            auth_token: None,
            owner_id: None,
            chunk_size: default_chunk_size(),
            max_concurrency: default_concurrency(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_delay_ms(),
            verify_integrity: default_true(),
            request_timeout_secs: default_request_timeout(),
            notify_endpoints: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default file there if
    /// none exists.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`, readable only by the owner on Unix.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix; the file may hold a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            chunk_size: self.chunk_size,
            max_concurrency: self.max_concurrency,
            retry_count: self.retry_count,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            verify_integrity: self.verify_integrity,
        }
    }

    pub fn service_config(&self) -> HttpServiceConfig {
        HttpServiceConfig {
            base_url: self.server_url.clone(),
            auth_token: self.auth_token.clone().filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Notification settings for `owner_id`.
    pub fn notify_config(&self, owner_id: i64) -> anyhow::Result<NotifyConfig> {
        let endpoints = if self.notify_endpoints.is_empty() {
            let endpoint = NotifyConfig::endpoint_from_base_url(&self.server_url)
                .ok_or_else(|| {
                    anyhow::anyhow!("cannot derive notification endpoint from {}", self.server_url)
                })?;
            vec![endpoint]
        } else {
            self.notify_endpoints.clone()
        };
        Ok(NotifyConfig::new(endpoints, owner_id))
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkflow")
            .join("config.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkflow").join("config.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/chunkflow/config.toml")
    }
}

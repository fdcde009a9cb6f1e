use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::Limits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// REST API base (e.g., https://api.github.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Repository owner
    #[serde(default)]
    pub owner: String,

    /// Repository holding the drive
    #[serde(default = "default_repo")]
    pub repo: String,

    /// Branch to commit to (repository default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Personal access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-blob upload ceiling in bytes
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: u64,

    /// Maximum entries in one batch selection
    #[serde(default = "default_max_selection")]
    pub max_selection: usize,

    /// Pause between sequential downloads in milliseconds
    #[serde(default = "default_download_delay")]
    pub download_delay_ms: u64,

    /// Per-call backend timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a directory listing may be served from cache (0 disables)
    #[serde(default = "default_listing_ttl")]
    pub listing_ttl_secs: u64,

    /// Storage quota shown against usage, in bytes
    #[serde(default = "default_quota")]
    pub quota_bytes: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_repo() -> String {
    "my-personal-drive".to_string()
}
fn default_max_blob_bytes() -> u64 {
    25 * 1024 * 1024
}
fn default_max_selection() -> usize {
    5
}
fn default_download_delay() -> u64 {
    500
}
fn default_request_timeout() -> u64 {
    30
}
fn default_listing_ttl() -> u64 {
    5
}
fn default_quota() -> u64 {
    1024 * 1024 * 1024
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            owner: String::new(),
            repo: default_repo(),
            branch: None,
            token: None,
            max_blob_bytes: default_max_blob_bytes(),
            max_selection: default_max_selection(),
            download_delay_ms: default_download_delay(),
            request_timeout_secs: default_request_timeout(),
            listing_ttl_secs: default_listing_ttl(),
            quota_bytes: default_quota(),
        }
    }
}

impl DriveConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "repodrive", "repodrive") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("repodrive-config.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Operational limits handed to a session
    pub fn limits(&self) -> Limits {
        Limits {
            max_blob_bytes: self.max_blob_bytes,
            max_selection: self.max_selection,
            download_delay: Duration::from_millis(self.download_delay_ms),
            request_timeout: self.request_timeout(),
            listing_ttl: Duration::from_secs(self.listing_ttl_secs),
            quota_bytes: self.quota_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: DriveConfig = serde_json::from_str(r#"{"owner":"octo"}"#).unwrap();
        assert_eq!(config.owner, "octo");
        assert_eq!(config.repo, "my-personal-drive");
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.max_blob_bytes, 25 * 1024 * 1024);
        assert_eq!(config.max_selection, 5);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_limits_from_config() {
        let config = DriveConfig {
            download_delay_ms: 250,
            listing_ttl_secs: 0,
            ..DriveConfig::default()
        };
        let limits = config.limits();
        assert_eq!(limits.download_delay, Duration::from_millis(250));
        assert_eq!(limits.listing_ttl, Duration::ZERO);
        assert_eq!(limits.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = DriveConfig {
            owner: "octo".into(),
            branch: Some("main".into()),
            ..DriveConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = DriveConfig::load(&path).unwrap();
        assert_eq!(loaded.owner, "octo");
        assert_eq!(loaded.branch.as_deref(), Some("main"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("token"));
    }
}

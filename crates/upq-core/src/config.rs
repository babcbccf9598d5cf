use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerOptions;
use crate::transport::HttpTimeouts;
use crate::validate::{ExtensionSet, ValidationRules};

/// Setup errors. Raised immediately when a session is being built, never deferred.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("an upload URL is required (set `url` in config.toml or pass --url)")]
    MissingUrl,
    #[error("invalid upload URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("the success callback is required")]
    MissingSuccessCallback,
    #[error("the failure callback is required")]
    MissingFailureCallback,
    #[error("a request body former is required for the HTTP transport")]
    MissingFormRequest,
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// HTTP transfer timeouts (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Seconds allowed for connection setup.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for one whole upload.
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 3600,
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_max_concurrent() -> usize {
    3
}

fn default_auto_upload() -> bool {
    true
}

/// Global configuration loaded from `~/.config/upq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload endpoint. Required before any upload starts.
    #[serde(default)]
    pub url: Option<String>,
    /// Content-Type header sent with each upload.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// HTTP method used for uploads.
    #[serde(default = "default_method")]
    pub method: String,
    /// Largest accepted file in bytes (None or 0 = no limit).
    #[serde(default)]
    pub max_file_size: Option<u64>,
    /// Smallest accepted file in bytes (None or 0 = no limit).
    #[serde(default)]
    pub min_file_size: Option<u64>,
    /// Comma-separated allow-list of extensions, e.g. "jpg,png". None = any.
    #[serde(default)]
    pub extensions: Option<String>,
    /// Maximum number of simultaneous uploads.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Start uploading as soon as files are added.
    #[serde(default = "default_auto_upload")]
    pub auto_upload: bool,
    /// Optional timeouts; built-in defaults when missing.
    #[serde(default)]
    pub transport: Option<TransportConfig>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: None,
            content_type: default_content_type(),
            method: default_method(),
            max_file_size: None,
            min_file_size: None,
            extensions: None,
            max_concurrent: default_max_concurrent(),
            auto_upload: default_auto_upload(),
            transport: None,
        }
    }
}

impl UploadConfig {
    /// Checks required settings. Returns the upload URL on success.
    pub fn validate(&self) -> Result<&str, ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(url)
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            extensions: self.extensions.as_deref().map(ExtensionSet::parse),
            max_file_size: self.max_file_size,
            min_file_size: self.min_file_size,
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_concurrent: self.max_concurrent,
            auto_upload: self.auto_upload,
            rules: self.validation_rules(),
        }
    }

    pub fn timeouts(&self) -> HttpTimeouts {
        let t = self.transport.clone().unwrap_or_default();
        HttpTimeouts {
            connect: Duration::from_secs(t.connect_timeout_secs),
            total: Duration::from_secs(t.timeout_secs),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("upq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UploadConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] but for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<UploadConfig> {
    if !path.exists() {
        let default_cfg = UploadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: UploadConfig = toml::from_str(&data)?;
    Ok(cfg)
}

//! Configuration file parser for ~/.config/feedloom/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout applied to every direct and proxied request.
    pub request_timeout_secs: u64,

    /// Maximum accepted response body size.
    pub max_feed_size_bytes: usize,

    /// Number of feeds refreshed at once by the orchestrator (1 = sequential).
    pub refresh_concurrency: usize,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// SQLite database backing the key-value store. Defaults to the config dir.
    pub database_path: Option<PathBuf>,

    /// Fallback proxy used when direct fetches are blocked or fail.
    pub proxy: ProxyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_feed_size_bytes: 10 * 1024 * 1024,
            refresh_concurrency: 1,
            user_agent: concat!("feedloom/", env!("CARGO_PKG_VERSION")).to_string(),
            database_path: None,
            proxy: ProxyConfig::default(),
        }
    }
}

/// URL-rewriting proxy endpoint.
///
/// The target URL is passed as the `url_param` query parameter of `base_url`.
/// When both credential fields are set they are appended as one more query
/// parameter identifying the caller.
///
/// SEC-015: `credential_value` is a `SecretString`, so `Debug` masks it.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub base_url: String,
    pub url_param: String,
    pub credential_name: Option<String>,
    pub credential_value: Option<SecretString>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.allorigins.win/raw".to_string(),
            url_param: "url".to_string(),
            credential_name: None,
            credential_value: None,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "request_timeout_secs",
                "max_feed_size_bytes",
                "refresh_concurrency",
                "user_agent",
                "database_path",
                "proxy",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            timeout_secs = config.request_timeout_secs,
            concurrency = config.refresh_concurrency,
            proxy = %config.proxy.base_url,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

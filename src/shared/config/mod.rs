//! Application configuration module
//!
//! `AppConfig` holds everything the messaging core needs to reach the
//! REST backend and the push service, plus client-side tuning knobs.
//! It can be built in code with [`AppConfigBuilder`] or loaded from a TOML
//! file:
//!
//! ```toml
//! api_url = "https://api.daydeskr.example"
//! message_page_size = 50
//!
//! [push]
//! host = "push.daydeskr.example"
//! port = 443
//! key = "app-key"
//! tls = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_PUSH_HOST: &str = "localhost";
const DEFAULT_PUSH_PORT: u16 = 8080;
const DEFAULT_PUSH_KEY: &str = "local-key";
const DEFAULT_AUTH_PATH: &str = "/broadcasting/auth";

/// Pusher protocol revision spoken by the push client
pub const PUSHER_PROTOCOL: u8 = 7;

/// Push service connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub host: String,
    pub port: u16,
    /// Application key, part of the socket path
    pub key: String,
    /// Use `wss://` instead of `ws://`
    pub tls: bool,
    /// Channel authorization endpoint, relative to `api_url`
    pub auth_path: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PUSH_HOST.to_string(),
            port: DEFAULT_PUSH_PORT,
            key: DEFAULT_PUSH_KEY.to_string(),
            tls: false,
            auth_path: DEFAULT_AUTH_PATH.to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST backend base URL
    pub api_url: String,
    pub push: PushConfig,
    /// Messages requested per page
    pub message_page_size: u32,
    /// Search hits requested per page
    pub search_page_size: u32,
    /// Quick-search debounce in milliseconds
    pub search_debounce_ms: u64,
    /// Maximum number of remembered search queries
    pub search_history_limit: usize,
    /// Longest reply chain a new reply may extend
    pub reply_depth_limit: usize,
    /// Attempt a single reconnect when the push connection drops
    pub reconnect_on_disconnect: bool,
    /// Where client-side files (search history) live
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            push: PushConfig::default(),
            message_page_size: 50,
            search_page_size: 20,
            search_debounce_ms: 300,
            search_history_limit: 10,
            reply_depth_limit: 32,
            reconnect_on_disconnect: true,
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = Url::parse(&self.api_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.api_url, e)))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                self.api_url
            )));
        }
        if self.push.host.trim().is_empty() {
            return Err(ConfigError::MissingValue("push.host"));
        }
        if self.push.key.trim().is_empty() {
            return Err(ConfigError::MissingValue("push.key"));
        }
        if !self.push.auth_path.starts_with('/') {
            return Err(ConfigError::invalid("push.auth_path", "must start with '/'"));
        }
        if self.message_page_size == 0 {
            return Err(ConfigError::invalid("message_page_size", "must be positive"));
        }
        if self.search_page_size == 0 {
            return Err(ConfigError::invalid("search_page_size", "must be positive"));
        }
        if self.search_history_limit == 0 {
            return Err(ConfigError::invalid("search_history_limit", "must be positive"));
        }
        Ok(())
    }

    /// Full URL of a REST endpoint
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Channel authorization URL
    pub fn auth_url(&self) -> String {
        self.api_endpoint(&self.push.auth_path)
    }

    /// WebSocket URL of the push service
    pub fn push_url(&self) -> String {
        let scheme = if self.push.tls { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/app/{}?protocol={}&client=daydeskr-rs&version={}",
            scheme,
            self.push.host,
            self.push.port,
            self.push.key,
            PUSHER_PROTOCOL,
            env!("CARGO_PKG_VERSION")
        )
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the REST backend URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn push_host(mut self, host: impl Into<String>) -> Self {
        self.config.push.host = host.into();
        self
    }

    pub fn push_port(mut self, port: u16) -> Self {
        self.config.push.port = port;
        self
    }

    pub fn push_key(mut self, key: impl Into<String>) -> Self {
        self.config.push.key = key.into();
        self
    }

    pub fn push_tls(mut self, tls: bool) -> Self {
        self.config.push.tls = tls;
        self
    }

    pub fn message_page_size(mut self, size: u32) -> Self {
        self.config.message_page_size = size;
        self
    }

    pub fn search_page_size(mut self, size: u32) -> Self {
        self.config.search_page_size = size;
        self
    }

    pub fn search_debounce_ms(mut self, millis: u64) -> Self {
        self.config.search_debounce_ms = millis;
        self
    }

    pub fn search_history_limit(mut self, limit: usize) -> Self {
        self.config.search_history_limit = limit;
        self
    }

    pub fn reply_depth_limit(mut self, limit: usize) -> Self {
        self.config.reply_depth_limit = limit;
        self
    }

    pub fn reconnect_on_disconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect_on_disconnect = enabled;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

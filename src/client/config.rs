use std::path::PathBuf;

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use crate::shared::messaging::UserId;

/// Optional TOML file loaded before environment overrides
pub const CONFIG_FILE_ENV: &str = "DAYDESKR_CONFIG";

/// Client configuration: application settings plus session credentials.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
    token: Option<String>,
    current_user_id: Option<UserId>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::from_app(builder.build()?))
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self {
            app,
            token: None,
            current_user_id: None,
        }
    }

    /// Read configuration from `DAYDESKR_CONFIG` (if set) and `DAYDESKR_*`
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut app = match lookup(CONFIG_FILE_ENV) {
            Some(path) => AppConfig::load_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(url) = lookup("DAYDESKR_API_URL") {
            app.api_url = url;
        }
        if let Some(host) = lookup("DAYDESKR_PUSH_HOST") {
            app.push.host = host;
        }
        if let Some(port) = lookup("DAYDESKR_PUSH_PORT") {
            app.push.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "push.port",
                message: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(key) = lookup("DAYDESKR_PUSH_KEY") {
            app.push.key = key;
        }
        if let Some(tls) = lookup("DAYDESKR_PUSH_TLS") {
            app.push.tls = matches!(tls.as_str(), "1" | "true" | "yes");
        }
        if let Some(dir) = lookup("DAYDESKR_DATA_DIR") {
            app.data_dir = Some(PathBuf::from(dir));
        }
        app.validate()?;

        let mut config = Self::from_app(app);
        config.token = lookup("DAYDESKR_TOKEN").filter(|t| !t.is_empty());
        config.current_user_id = lookup("DAYDESKR_USER_ID").and_then(|id| id.parse().ok());
        Ok(config)
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn set_current_user_id(&mut self, user_id: Option<UserId>) {
        self.current_user_id = user_id;
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.current_user_id
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        self.app.api_endpoint(path)
    }

    /// Directory for client-side files, falling back to the platform data dir
    pub fn data_dir(&self) -> PathBuf {
        self.app
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("daydeskr")))
            .unwrap_or_else(|| PathBuf::from(".daydeskr"))
    }
}

//! Application configuration module
//!
//! Provides the configuration for reaching the hosted backend, built either by hand
//! through [`AppConfigBuilder`], from environment variables or from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Default site URL used for password-reset redirects
const DEFAULT_SITE_URL: &str = "http://localhost:5173";

/// Default bound on the initial message fetch
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default realtime heartbeat interval
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL, without trailing slash
    pub backend_url: String,
    /// Public (anonymous) API key
    pub anon_key: String,
    /// Site URL the password-reset mail links back to
    pub site_url: String,
    /// Bound on the initial message fetch and on realtime joins
    pub fetch_timeout: Duration,
    /// Interval between realtime heartbeats
    pub heartbeat_interval: Duration,
    /// Whether the auth session is saved across restarts
    pub persist_session: bool,
    /// Where the auth session is saved
    pub session_file: Option<PathBuf>,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Build the configuration from `SUPABASE_*` and `TALK_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = AppConfig::builder()
            .backend_url(env_required("SUPABASE_URL")?)
            .anon_key(env_required("SUPABASE_ANON_KEY")?);

        if let Ok(site_url) = std::env::var("TALK_SITE_URL") {
            builder = builder.site_url(site_url);
        }
        if let Ok(secs) = std::env::var("TALK_FETCH_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("TALK_FETCH_TIMEOUT_SECS", secs))?;
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        if let Ok(flag) = std::env::var("TALK_PERSIST_SESSION") {
            builder = builder.persist_session(!matches!(flag.trim(), "0" | "false" | "no"));
        }
        if let Ok(path) = std::env::var("TALK_SESSION_FILE") {
            builder = builder.session_file(PathBuf::from(path));
        }

        builder.build()
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: FileConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut builder = AppConfig::builder()
            .backend_url(file.backend_url)
            .anon_key(file.anon_key);
        if let Some(site_url) = file.site_url {
            builder = builder.site_url(site_url);
        }
        if let Some(secs) = file.fetch_timeout_secs {
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = file.heartbeat_interval_secs {
            builder = builder.heartbeat_interval(Duration::from_secs(secs));
        }
        if let Some(persist) = file.persist_session {
            builder = builder.persist_session(persist);
        }
        if let Some(path) = file.session_file {
            builder = builder.session_file(path);
        }
        builder.build()
    }

    /// Read and parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.backend_url)
            .map_err(|_| ConfigError::InvalidUrl(self.backend_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(self.backend_url.clone()));
        }
        Url::parse(&self.site_url).map_err(|_| ConfigError::InvalidUrl(self.site_url.clone()))?;
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::MissingValue("anon_key"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "fetch_timeout",
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL of an auth endpoint, e.g. `auth_url("/token")`
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.backend_url, path)
    }

    /// Full URL of a table in the data API
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.backend_url, table)
    }

    /// Websocket URL of the realtime service
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.backend_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.backend_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.backend_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }

    /// Where the password-reset mail sends the user
    pub fn reset_redirect_url(&self) -> String {
        format!("{}/reset-password", self.site_url.trim_end_matches('/'))
    }

    /// Session file location, if sessions are persisted
    pub fn session_path(&self) -> Option<PathBuf> {
        if !self.persist_session {
            return None;
        }
        self.session_file.clone().or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
            path.push("talk");
            path.push("session.json");
            Some(path)
        })
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    backend_url: Option<String>,
    anon_key: Option<String>,
    site_url: Option<String>,
    fetch_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    persist_session: Option<bool>,
    session_file: Option<PathBuf>,
}

impl AppConfigBuilder {
    /// Set the backend base URL
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    /// Set the anonymous API key
    pub fn anon_key(mut self, key: impl Into<String>) -> Self {
        self.anon_key = Some(key.into());
        self
    }

    /// Set the site URL used for reset redirects
    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Set the initial fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set the realtime heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Enable or disable session persistence
    pub fn persist_session(mut self, persist: bool) -> Self {
        self.persist_session = Some(persist);
        self
    }

    /// Set the session file path
    pub fn session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig {
            backend_url: self
                .backend_url
                .ok_or(ConfigError::MissingValue("backend_url"))?
                .trim_end_matches('/')
                .to_string(),
            anon_key: self.anon_key.ok_or(ConfigError::MissingValue("anon_key"))?,
            site_url: self.site_url.unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            persist_session: self.persist_session.unwrap_or(true),
            session_file: self.session_file,
        };
        config.validate()?;
        Ok(config)
    }
}

/// On-disk shape of the TOML configuration
#[derive(Debug, Deserialize)]
struct FileConfig {
    backend_url: String,
    anon_key: String,
    site_url: Option<String>,
    fetch_timeout_secs: Option<u64>,
    heartbeat_interval_secs: Option<u64>,
    persist_session: Option<bool>,
    session_file: Option<PathBuf>,
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingValue(name))
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to read config: {0}")]
    Io(String),
}

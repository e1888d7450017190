//! Client configuration.
//!
//! Configuration is loaded once at startup from:
//! - a TOML file (default: ~/.config/decklens/client.toml, `[client]` table)
//! - environment variables (`DECKLENS_*` prefixed) when no file exists
//!
//! # Example
//!
//! ```rust,no_run
//! use decklens_client::config::ClientConfig;
//!
//! // Load from default path or fall back to env vars
//! let config = ClientConfig::load().expect("Failed to load config");
//!
//! // Or from environment variables only
//! let config = ClientConfig::from_env();
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use decklens_core::defaults;

/// Base URL override.
pub const ENV_API_URL: &str = "DECKLENS_API_URL";
/// Poll interval in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "DECKLENS_POLL_INTERVAL_MS";
/// Status route: `jobs`, `upload-progress` or `auto`.
pub const ENV_STATUS_ROUTE: &str = "DECKLENS_STATUS_ROUTE";
/// Per-request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "DECKLENS_REQUEST_TIMEOUT_SECS";
/// Upload size limit in bytes.
pub const ENV_MAX_UPLOAD_BYTES: &str = "DECKLENS_MAX_UPLOAD_BYTES";
/// Consecutive failed poll ticks before giving up (unset = never).
pub const ENV_POLL_MAX_ERRORS: &str = "DECKLENS_POLL_MAX_ERRORS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid status route: {0}")]
    InvalidRoute(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for decklens_core::Error {
    fn from(e: ConfigError) -> Self {
        decklens_core::Error::Config(e.to_string())
    }
}

/// Which status endpoint the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StatusRoute {
    /// `GET /api/jobs/{id}/status/`
    Jobs,
    /// `GET /api/upload-progress/{id}/`
    UploadProgress,
    /// Try `Jobs`, fall back to `UploadProgress` on 404.
    #[default]
    Auto,
}

impl StatusRoute {
    /// Path for a concrete route. `Auto` resolves to the jobs route.
    pub fn path(self, job_id: &str) -> String {
        match self {
            Self::Jobs | Self::Auto => format!("/api/jobs/{}/status/", job_id),
            Self::UploadProgress => format!("/api/upload-progress/{}/", job_id),
        }
    }
}

impl FromStr for StatusRoute {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "jobs" => Ok(Self::Jobs),
            "upload-progress" => Ok(Self::UploadProgress),
            "auto" => Ok(Self::Auto),
            _ => Err(ConfigError::InvalidRoute(s.to_string())),
        }
    }
}

impl fmt::Display for StatusRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jobs => write!(f, "jobs"),
            Self::UploadProgress => write!(f, "upload-progress"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the processing API.
    pub base_url: String,
    /// Interval between status requests.
    pub poll_interval_ms: u64,
    /// Status endpoint variant.
    pub status_route: StatusRoute,
    /// Timeout for a single request, including uploads.
    pub request_timeout_secs: u64,
    /// Largest file accepted into an upload slot.
    pub max_upload_bytes: u64,
    /// Give up after this many consecutive failed poll ticks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_max_consecutive_errors: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_URL.to_string(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            status_route: StatusRoute::default(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            poll_max_consecutive_errors: None,
        }
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ClientConfig {
    /// Get the default config file path.
    ///
    /// Returns: ~/.config/decklens/client.toml
    pub fn default_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        path.push("decklens");
        path.push("client.toml");
        path
    }

    /// Load configuration from the default path, falling back to environment
    /// variables.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_config_path();

        if path.exists() {
            info!("Loading client config from: {}", path.display());
            Self::from_file(&path)
        } else {
            debug!(
                "Config file not found at {}, using environment variables",
                path.display()
            );
            let config = Self::from_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let content = Self::substitute_env_vars(&content);

        #[derive(Deserialize)]
        struct TomlRoot {
            #[serde(default)]
            client: ClientConfig,
        }

        let root: TomlRoot = toml::from_str(&content)?;
        root.client.validate()?;
        Ok(root.client)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let fallback = Self::default();

        Self {
            base_url: env::var(ENV_API_URL)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback.base_url),
            poll_interval_ms: env_parsed(ENV_POLL_INTERVAL_MS).unwrap_or(fallback.poll_interval_ms),
            status_route: env_parsed(ENV_STATUS_ROUTE).unwrap_or(fallback.status_route),
            request_timeout_secs: env_parsed(ENV_REQUEST_TIMEOUT_SECS)
                .unwrap_or(fallback.request_timeout_secs),
            max_upload_bytes: env_parsed(ENV_MAX_UPLOAD_BYTES)
                .unwrap_or(fallback.max_upload_bytes),
            poll_max_consecutive_errors: env_parsed(ENV_POLL_MAX_ERRORS),
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Override the status route.
    pub fn with_status_route(mut self, route: StatusRoute) -> Self {
        self.status_route = route;
        self
    }

    /// Cap consecutive failed poll ticks.
    pub fn with_poll_max_consecutive_errors(mut self, max: Option<u32>) -> Self {
        self.poll_max_consecutive_errors = max;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without trailing slashes.
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.poll_max_consecutive_errors == Some(0) {
            return Err(ConfigError::Validation(
                "poll_max_consecutive_errors must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Substitute environment variables in the format ${VAR_NAME}.
    fn substitute_env_vars(content: &str) -> String {
        let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex is valid");
        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.status_route, StatusRoute::Auto);
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = ClientConfig::default().with_base_url("localhost:8000");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = ClientConfig::default().with_base_url("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ClientConfig::default().with_poll_interval_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_error_cap() {
        let config = ClientConfig::default().with_poll_max_consecutive_errors(Some(0));
        assert!(config.validate().is_err());
        let config = ClientConfig::default().with_poll_max_consecutive_errors(Some(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_root_trims_trailing_slash() {
        let config = ClientConfig::default().with_base_url("https://decks.example.com//");
        assert_eq!(config.api_root(), "https://decks.example.com");
    }

    #[test]
    fn test_status_route_parse_and_paths() {
        assert_eq!("jobs".parse::<StatusRoute>().unwrap(), StatusRoute::Jobs);
        assert_eq!(
            "upload_progress".parse::<StatusRoute>().unwrap(),
            StatusRoute::UploadProgress
        );
        assert_eq!("AUTO".parse::<StatusRoute>().unwrap(), StatusRoute::Auto);
        assert!("websocket".parse::<StatusRoute>().is_err());

        assert_eq!(StatusRoute::Jobs.path("abc"), "/api/jobs/abc/status/");
        assert_eq!(
            StatusRoute::UploadProgress.path("abc"),
            "/api/upload-progress/abc/"
        );
    }

    #[test]
    fn test_from_file_reads_client_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[client]\nbase_url = \"https://decks.example.com\"\npoll_interval_ms = 2000\nstatus_route = \"upload-progress\"\npoll_max_consecutive_errors = 5"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "https://decks.example.com");
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.status_route, StatusRoute::UploadProgress);
        assert_eq!(config.poll_max_consecutive_errors, Some(5));
        assert_eq!(config.request_timeout_secs, defaults::REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\npoll_interval_ms = 0").unwrap();
        assert!(matches!(
            ClientConfig::from_file(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_env_var_substitution_with_value() {
        let content = "base_url = \"${DECKLENS_TEST_SUBSTITUTION_URL}\"";

        env::set_var("DECKLENS_TEST_SUBSTITUTION_URL", "http://10.0.0.5:8000");
        let result = ClientConfig::substitute_env_vars(content);
        env::remove_var("DECKLENS_TEST_SUBSTITUTION_URL");

        assert_eq!(result, "base_url = \"http://10.0.0.5:8000\"");
    }

    #[test]
    fn test_env_var_substitution_missing() {
        let content = "base_url = \"${DECKLENS_NONEXISTENT_TEST_VAR_12345}\"";
        let result = ClientConfig::substitute_env_vars(content);
        assert_eq!(result, content);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ClientConfig::default().with_status_route(StatusRoute::Jobs);
        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("status_route = \"jobs\""));
        let parsed: ClientConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}

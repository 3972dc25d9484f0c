use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8888";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_USER_AGENT: &str = "chatstream-cli";

const ENV_API_URL: &str = "CHATSTREAM_API_URL";
const ENV_LOG_LEVEL: &str = "CHATSTREAM_LOG_LEVEL";
const ENV_CONNECT_TIMEOUT: &str = "CHATSTREAM_CONNECT_TIMEOUT_SECS";

/// Errors raised while resolving a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not one of the supported formats.
    #[error("Unsupported configuration format for {path}. Use 'yaml', 'json' or 'toml'.")]
    UnsupportedFormat { path: PathBuf },

    /// The file contents did not deserialize.
    #[error("failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value from the environment or command line was rejected.
    #[error("Invalid {field} value: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Settings for talking to the chat service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat service; endpoints live under `api/chat/`.
    pub api_base_url: Url,

    /// Upper bound on establishing the TCP/TLS connection. Reading the body
    /// is never time-limited because replies stream for as long as they take.
    pub connect_timeout_secs: u64,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ClientConfig {
    /// Generates a default configuration.
    ///
    /// # Panics
    /// Never in practice: the default base URL is a valid literal.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Values set in the file win over environment variables; environment
    /// variables only fill in values the file left at their defaults. The
    /// `server_override` (usually a `--server` flag) wins over both.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a `.yaml`, `.yml`, `.json` or `.toml` file.
    /// * `server_override` - Optional base URL that replaces `api_base_url`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or if a
    /// resolved value is invalid.
    pub fn load_config(
        config_path: Option<&Path>,
        server_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::with_defaults();
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => defaults.clone(),
        };

        if config.api_base_url == defaults.api_base_url
            && let Ok(url) = env::var(ENV_API_URL)
        {
            config.api_base_url = parse_base_url(ENV_API_URL, &url)?;
        }
        if config.log_level == defaults.log_level
            && let Ok(level) = env::var(ENV_LOG_LEVEL)
        {
            config.log_level = level;
        }
        if config.connect_timeout_secs == defaults.connect_timeout_secs
            && let Ok(secs) = env::var(ENV_CONNECT_TIMEOUT)
        {
            config.connect_timeout_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    field: ENV_CONNECT_TIMEOUT,
                    message: format!("'{secs}' is not a whole number of seconds"),
                })?;
        }

        if let Some(server) = server_override {
            config.api_base_url = parse_base_url("--server", server)?;
        }

        config.validate()?;
        debug!(api_base_url = %config.api_base_url, "resolved client configuration");
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => {
                serde_yml::from_str(&content).map_err(|err| parse_error(err.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|err| parse_error(err.to_string()))
            }
            Some("toml") => toml::from_str(&content).map_err(|err| parse_error(err.to_string())),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Checks the resolved values.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for a non-HTTP(S) base URL or a
    /// zero connect timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                message: format!("scheme must be http or https, got '{}'", self.api_base_url),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_secs",
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolves an endpoint path such as `api/chat/stream` against the base URL.
    ///
    /// A base URL with a path prefix (`https://host/proxy`) keeps that prefix.
    ///
    /// # Errors
    /// Returns a [`url::ParseError`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.api_base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
    }
}

fn parse_base_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::InvalidValue {
        field,
        message: format!("'{value}' is not a valid URL: {err}"),
    })
}

/// Location of the per-user configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("chatstream").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./chatstream.toml"))
}

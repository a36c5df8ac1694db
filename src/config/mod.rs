//! Configuration: `config.toml` for the non-secret half, environment (and
//! `.env`) for client credentials.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::ClientCredentials;
use crate::error::{RelayError, Result};
use crate::store::StateStoreConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub callback_port: u16,
    /// Overrides the `http://localhost:{callback_port}/callback` default.
    pub redirect_uri: Option<String>,
    pub scope: Vec<String>,
    pub show_dialog: bool,
    pub client: ClientEnvConfig,
    pub endpoints: EndpointConfig,
    pub polling: PollingConfig,
    pub expiry_skew_secs: i64,
    pub state_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            callback_port: 8888,
            redirect_uri: None,
            scope: vec![
                "user-library-read".to_string(),
                "playlist-read-private".to_string(),
            ],
            show_dialog: true,
            client: ClientEnvConfig::default(),
            endpoints: EndpointConfig::default(),
            polling: PollingConfig::default(),
            expiry_skew_secs: 60,
            state_dir: None,
        }
    }
}

/// Names of the environment variables holding the client credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientEnvConfig {
    pub id_env: String,
    pub secret_env: String,
}

impl Default for ClientEnvConfig {
    fn default() -> Self {
        Self {
            id_env: "TOKENRELAY_CLIENT_ID".to_string(),
            secret_env: "TOKENRELAY_CLIENT_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub authorize: String,
    pub token: String,
    pub api: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            authorize: "https://accounts.spotify.com/authorize".to_string(),
            token: "https://accounts.spotify.com/api/token".to_string(),
            api: "https://api.spotify.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 180,
        }
    }
}

/// Interval and wall-clock ceiling for the authorization wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        PollingConfig::default().policy()
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_secs(self.interval_secs),
            ceiling: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl RelayConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(RelayError::Io(err)),
        };
        let config = Self::from_toml_str(&raw).map_err(|err| match err {
            RelayError::Configuration(msg) => {
                RelayError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|err| RelayError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_secs == 0 {
            return Err(RelayError::Configuration(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.polling.timeout_secs < self.polling.interval_secs {
            return Err(RelayError::Configuration(
                "polling.timeout_secs must not be shorter than polling.interval_secs".to_string(),
            ));
        }
        if self.expiry_skew_secs < 0 {
            return Err(RelayError::Configuration(
                "expiry_skew_secs must not be negative".to_string(),
            ));
        }
        if let Some(uri) = &self.redirect_uri {
            reqwest::Url::parse(uri).map_err(|err| {
                RelayError::Configuration(format!("redirect_uri is not a URL: {err}"))
            })?;
        }
        for (name, url) in [
            ("endpoints.authorize", &self.endpoints.authorize),
            ("endpoints.token", &self.endpoints.token),
            ("endpoints.api", &self.endpoints.api),
        ] {
            reqwest::Url::parse(url)
                .map_err(|err| RelayError::Configuration(format!("{name} is not a URL: {err}")))?;
        }
        Ok(())
    }

    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/callback", self.callback_port))
    }

    /// Loopback address for the callback receiver.
    ///
    /// The port comes from the redirect URI the authorization server will
    /// send the browser to, so an overridden `redirect_uri` wins over
    /// `callback_port`.
    pub fn callback_addr(&self) -> Result<SocketAddr> {
        let url = reqwest::Url::parse(&self.redirect_uri())
            .map_err(|err| RelayError::Configuration(format!("redirect_uri is not a URL: {err}")))?;
        let port = url.port_or_known_default().unwrap_or(self.callback_port);
        Ok(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }

    pub fn polling_policy(&self) -> PollingPolicy {
        self.polling.policy()
    }

    pub fn expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_skew_secs)
    }

    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(StateStoreConfig::default_dir)
    }

    /// Read client credentials from the configured environment variables,
    /// loading `.env` first if present.
    pub fn client_credentials_from_env(&self) -> Result<ClientCredentials> {
        let _ = dotenvy::dotenv();
        let read = |var: &str| {
            std::env::var(var).map_err(|_| {
                RelayError::Configuration(format!("Environment variable {var} not set"))
            })
        };
        Ok(ClientCredentials::new(
            read(&self.client.id_env)?,
            read(&self.client.secret_env)?,
        ))
    }
}

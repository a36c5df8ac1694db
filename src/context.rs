//! Explicit application context handed to every component.

use crate::auth::ClientCredentials;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::http::HttpClient;
use crate::store::PersistedState;

/// Configuration, persisted state and HTTP client for one process.
///
/// # Example
/// ```no_run
/// use tokenrelay::config::RelayConfig;
/// use tokenrelay::context::AppContext;
///
/// let config = RelayConfig::load_from_path("config.toml")?;
/// let ctx = AppContext::from_config(config)?;
/// # Ok::<(), tokenrelay::error::RelayError>(())
/// ```
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: RelayConfig,
    pub state: PersistedState,
    pub http: HttpClient,
}

impl AppContext {
    pub fn new(config: RelayConfig, state: PersistedState, http: HttpClient) -> Self {
        Self {
            config,
            state,
            http,
        }
    }

    /// File-backed state in the configured state directory.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let state = PersistedState::in_dir(config.resolved_state_dir());
        let http = HttpClient::new()?;
        Ok(Self::new(config, state, http))
    }

    /// Client credentials from the state store, bootstrapped from the
    /// environment on first use.
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        if let Some(credentials) = self.state.client_credentials()? {
            return Ok(credentials);
        }
        let credentials = self.config.client_credentials_from_env()?;
        self.state.set_client_credentials(&credentials)?;
        tracing::info!(client_id = %credentials.id, "stored client credentials from environment");
        Ok(credentials)
    }
}

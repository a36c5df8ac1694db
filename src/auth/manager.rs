use std::sync::Arc;

use chrono::Utc;

use crate::auth::browser::BrowserLauncher;
use crate::auth::coordinator::AuthorizationCoordinator;
use crate::auth::grant::TokenEndpoint;
use crate::auth::token::{AppAccessToken, UserAccessToken};
use crate::config::PollingPolicy;
use crate::context::AppContext;
use crate::error::{RelayError, Result};
use crate::store::PersistedState;

/// Owns the app and user token records.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tokenrelay::auth::{SystemBrowser, TokenManager};
/// use tokenrelay::config::RelayConfig;
/// use tokenrelay::context::AppContext;
///
/// # async fn run() -> tokenrelay::error::Result<()> {
/// let ctx = AppContext::from_config(RelayConfig::load_from_path("config.toml")?)?;
/// let manager = TokenManager::new(&ctx, Arc::new(SystemBrowser))?;
/// let app = manager.app_token().await?;
/// let user = manager.user_token().await?;
/// println!("{} / {}", app.access_token, user.access_token);
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    state: PersistedState,
    endpoint: TokenEndpoint,
    coordinator: AuthorizationCoordinator,
    skew: chrono::Duration,
}

impl TokenManager {
    pub fn new(ctx: &AppContext, browser: Arc<dyn BrowserLauncher>) -> Result<Self> {
        let credentials = ctx.client_credentials()?;
        let endpoint = TokenEndpoint::new(
            ctx.http.clone(),
            ctx.config.endpoints.token.clone(),
            credentials,
        );
        let coordinator = AuthorizationCoordinator::new(ctx, endpoint.clone(), browser);
        Ok(Self {
            state: ctx.state.clone(),
            endpoint,
            coordinator,
            skew: ctx.config.expiry_skew(),
        })
    }

    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.coordinator = self.coordinator.with_polling(polling);
        self
    }

    pub fn coordinator(&self) -> &AuthorizationCoordinator {
        &self.coordinator
    }

    /// Application token, reused while it is outside the expiry skew window.
    ///
    /// A rejected client-credentials grant is returned as [`RelayError::Auth`]
    /// and is not retried.
    pub async fn app_token(&self) -> Result<AppAccessToken> {
        if let Some(token) = self.state.app_token()? {
            if token.is_usable_at(Utc::now(), self.skew) {
                tracing::debug!(expires_at = %token.expires_at, "reusing stored app token");
                return Ok(token);
            }
            tracing::info!(expires_at = %token.expires_at, "stored app token is stale");
        }

        tracing::info!("requesting app token");
        let response = self.endpoint.client_credentials().await?;
        let token = AppAccessToken::from_response(response, Utc::now());
        ensure_access_token(&token.access_token)?;
        self.state.set_app_token(&token)?;
        Ok(token)
    }

    /// User token.
    ///
    /// With no stored record, or a record without a refresh token, this runs
    /// the browser authorization flow. Otherwise it always refreshes, even if
    /// the stored access token has not expired yet. A rejected refresh
    /// discards the stored record so the next call starts from scratch.
    pub async fn user_token(&self) -> Result<UserAccessToken> {
        let Some(stored) = self.state.user_token()? else {
            tracing::info!("no user token stored, starting authorization");
            return self.authorize().await;
        };
        match stored.refresh_token.clone() {
            Some(refresh_token) => self.refresh(&stored, &refresh_token).await,
            None => {
                tracing::info!("stored user token has no refresh token, re-authorizing");
                self.authorize().await
            }
        }
    }

    async fn authorize(&self) -> Result<UserAccessToken> {
        let token = self.coordinator.authorize().await?;
        ensure_access_token(&token.access_token)?;
        self.state.set_user_token(&token)?;
        tracing::info!(expires_at = %token.expires_at, "user authorized");
        Ok(token)
    }

    async fn refresh(&self, stored: &UserAccessToken, refresh_token: &str) -> Result<UserAccessToken> {
        match self.endpoint.refresh(refresh_token).await {
            Ok(response) => {
                let token = stored.refreshed(response, Utc::now());
                ensure_access_token(&token.access_token)?;
                self.state.set_user_token(&token)?;
                tracing::info!(expires_at = %token.expires_at, "user token refreshed");
                Ok(token)
            }
            Err(err @ RelayError::Auth { .. }) => {
                tracing::warn!(error = %err, "refresh rejected, discarding stored user token");
                self.state.clear_user_token()?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn ensure_access_token(access_token: &str) -> Result<()> {
    if access_token.is_empty() {
        return Err(RelayError::InvalidState(
            "token endpoint returned an empty access_token".to_string(),
        ));
    }
    Ok(())
}

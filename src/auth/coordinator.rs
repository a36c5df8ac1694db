use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::time::Instant;

use crate::auth::browser::BrowserLauncher;
use crate::auth::grant::TokenEndpoint;
use crate::auth::session::{AuthPhase, AuthorizationSession};
use crate::auth::token::UserAccessToken;
use crate::config::PollingPolicy;
use crate::context::AppContext;
use crate::error::{RelayError, Result};
use crate::store::PersistedState;

/// Drives one authorization-code attempt: browser redirect, bounded wait for
/// the callback receiver to drop a code into persisted state, code exchange.
///
/// The returned token is not persisted here; [`TokenManager`] owns the user
/// token record.
///
/// [`TokenManager`]: crate::auth::TokenManager
pub struct AuthorizationCoordinator {
    state: PersistedState,
    endpoint: TokenEndpoint,
    browser: Arc<dyn BrowserLauncher>,
    polling: PollingPolicy,
    authorize_url: String,
    redirect_uri: String,
    scope: String,
    show_dialog: bool,
    phase: Mutex<AuthPhase>,
}

impl AuthorizationCoordinator {
    pub fn new(ctx: &AppContext, endpoint: TokenEndpoint, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            state: ctx.state.clone(),
            endpoint,
            browser,
            polling: ctx.config.polling_policy(),
            authorize_url: ctx.config.endpoints.authorize.clone(),
            redirect_uri: ctx.config.redirect_uri(),
            scope: ctx.config.scope_string(),
            show_dialog: ctx.config.show_dialog,
            phase: Mutex::new(AuthPhase::Idle),
        }
    }

    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    pub fn polling(&self) -> PollingPolicy {
        self.polling
    }

    /// Phase reached by the most recent attempt.
    pub fn phase(&self) -> AuthPhase {
        self.phase.lock().map(|phase| *phase).unwrap_or(AuthPhase::Failed)
    }

    /// Authorization URL for a given `state` nonce.
    pub fn authorization_url(&self, state: &str) -> Result<reqwest::Url> {
        let show_dialog = if self.show_dialog { "true" } else { "false" };
        reqwest::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.endpoint.credentials().id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("scope", self.scope.as_str()),
                ("show_dialog", show_dialog),
            ],
        )
        .map_err(|err| RelayError::Configuration(format!("invalid authorize endpoint: {err}")))
    }

    /// Run a full attempt.
    ///
    /// The session record is removed before this returns, whatever the
    /// outcome, so its nonce cannot be replayed.
    pub async fn authorize(&self) -> Result<UserAccessToken> {
        self.reset_phase()?;

        let session = AuthorizationSession::start();
        self.state.set_session(&session)?;
        self.advance(AuthPhase::AwaitingRedirect)?;

        let waited = self.redirect_and_wait(&session).await;
        let teardown = self.state.clear_session();

        let code = match waited {
            Ok(Some(code)) => code,
            Ok(None) => {
                self.advance(AuthPhase::TimedOut)?;
                teardown?;
                tracing::error!(
                    ceiling_ms = self.polling.ceiling.as_millis() as u64,
                    "no authorization callback before the ceiling"
                );
                return Err(RelayError::Timeout(self.polling.ceiling.as_millis() as u64));
            }
            Err(err) => {
                self.set_phase(AuthPhase::Failed);
                if let Err(clear_err) = teardown {
                    tracing::warn!(error = %clear_err, "failed to remove authorization session");
                }
                return Err(err);
            }
        };
        if let Err(err) = teardown {
            self.set_phase(AuthPhase::Failed);
            return Err(err.into());
        }
        self.advance(AuthPhase::CodeReceived)?;

        self.advance(AuthPhase::Exchanging)?;
        match self
            .endpoint
            .authorization_code(&code, &self.redirect_uri)
            .await
        {
            Ok(response) => {
                self.advance(AuthPhase::Authorized)?;
                Ok(UserAccessToken::from_response(response, Utc::now()))
            }
            Err(err) => {
                self.advance(AuthPhase::Failed)?;
                Err(err)
            }
        }
    }

    async fn redirect_and_wait(&self, session: &AuthorizationSession) -> Result<Option<String>> {
        let url = self.authorization_url(&session.state)?;
        tracing::info!(url = %url, "waiting for authorization in the browser");
        if let Err(err) = self.browser.open(url.as_str()) {
            tracing::warn!(error = %err, url = %url, "could not open a browser, open the URL manually");
        }
        self.wait_for_code(&session.state).await
    }

    /// Sleep-then-check until a code for `nonce` shows up or the ceiling is
    /// reached. The ceiling is wall-clock, not a poll count.
    async fn wait_for_code(&self, nonce: &str) -> Result<Option<String>> {
        let deadline = Instant::now() + self.polling.ceiling;
        let mut polls = 0u32;
        loop {
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(polls, "polling ceiling reached");
                return Ok(None);
            }
            tokio::time::sleep(self.polling.interval.min(deadline - now)).await;
            polls += 1;

            match self.state.session()? {
                Some(current) if current.matches_state(nonce) => {
                    if let Some(received) = self.state.received_code()? {
                        if current.owns(&received) {
                            tracing::debug!(polls, "authorization code received");
                            return Ok(Some(received.code));
                        }
                    }
                }
                Some(_) => tracing::warn!("authorization session replaced by another attempt"),
                None => tracing::warn!("authorization session disappeared while waiting"),
            }
        }
    }

    /// Back to `Idle`, unless an attempt on this coordinator is still running.
    fn reset_phase(&self) -> Result<()> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| RelayError::InvalidState("authorization phase lock poisoned".into()))?;
        if *phase != AuthPhase::Idle && !phase.is_terminal() {
            return Err(RelayError::InvalidState(format!(
                "authorization already in progress ({})",
                *phase
            )));
        }
        *phase = AuthPhase::Idle;
        Ok(())
    }

    fn advance(&self, next: AuthPhase) -> Result<()> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| RelayError::InvalidState("authorization phase lock poisoned".into()))?;
        let from = *phase;
        if !from.can_advance_to(next) {
            return Err(RelayError::InvalidState(format!(
                "illegal authorization transition {from} -> {next}"
            )));
        }
        tracing::debug!(from = %from, to = %next, "authorization phase");
        *phase = next;
        Ok(())
    }

    fn set_phase(&self, next: AuthPhase) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = next;
        }
    }
}

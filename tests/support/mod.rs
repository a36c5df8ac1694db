#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokenrelay::auth::{
    AppAccessToken, BrowserLauncher, CallbackOutcome, CallbackReceiver, ClientCredentials,
    TokenManager, UserAccessToken,
};
use tokenrelay::config::{PollingPolicy, RelayConfig};
use tokenrelay::context::AppContext;
use tokenrelay::http::HttpClient;
use tokenrelay::store::PersistedState;
use wiremock::MockServer;

/// Records authorization URLs instead of opening them.
#[derive(Default)]
pub struct RecordingBrowser {
    opened: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("browser lock poisoned").clone()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> tokenrelay::error::Result<()> {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push(url.to_string());
        Ok(())
    }
}

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";

/// Config pointing every endpoint at `base`.
pub fn config_for(base: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.endpoints.authorize = format!("{base}/authorize");
    config.endpoints.token = format!("{base}/api/token");
    config.endpoints.api = format!("{base}/v1");
    config
}

/// In-memory context with client credentials already stored.
pub fn context_for(server: &MockServer) -> AppContext {
    context_with(config_for(&server.uri()), PersistedState::in_memory())
}

pub fn context_with(config: RelayConfig, state: PersistedState) -> AppContext {
    state
        .set_client_credentials(&ClientCredentials::new(CLIENT_ID, CLIENT_SECRET))
        .expect("seed client credentials");
    AppContext::new(config, state, HttpClient::new().expect("http client"))
}

pub fn fast_polling(ceiling_ms: u64) -> PollingPolicy {
    PollingPolicy {
        interval: Duration::from_millis(10),
        ceiling: Duration::from_millis(ceiling_ms),
    }
}

pub fn manager(ctx: &AppContext, polling: PollingPolicy) -> (TokenManager, Arc<RecordingBrowser>) {
    let browser = Arc::new(RecordingBrowser::new());
    let manager = TokenManager::new(ctx, browser.clone())
        .expect("token manager")
        .with_polling(polling);
    (manager, browser)
}

pub fn token_body(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

pub fn app_token(access_token: &str, expires_in_secs: i64) -> AppAccessToken {
    AppAccessToken {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
    }
}

pub fn user_token(access_token: &str, refresh_token: Option<&str>) -> UserAccessToken {
    UserAccessToken {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        scope: Some("user-library-read".to_string()),
        expires_at: Utc::now() + chrono::Duration::seconds(3600),
    }
}

/// Act as the browser redirect: wait for a session to appear, then deliver
/// `code` through the receiver with the session's own nonce.
pub fn spawn_redirect(ctx: &AppContext, code: &'static str) -> tokio::task::JoinHandle<CallbackOutcome> {
    let state = ctx.state.clone();
    let receiver = CallbackReceiver::new(ctx);
    tokio::spawn(async move {
        loop {
            if let Some(session) = state.session().expect("read session") {
                let target = format!("/callback?code={code}&state={}", session.state);
                return receiver.handle("GET", &target).expect("handle callback");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

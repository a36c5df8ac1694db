//! Loopback receiver for the authorization redirect.
//!
//! Runs in its own process (or task) and talks to the coordinator only
//! through persisted state: a valid callback writes a [`ReceivedCode`] tagged
//! with the session nonce and nothing else.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use crate::auth::session::ReceivedCode;
use crate::context::AppContext;
use crate::error::{RelayError, Result};
use crate::store::PersistedState;

const MAX_REQUEST_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single callback request amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// State matched and the code was stored.
    Accepted,
    /// No session, or its nonce differs from the `state` parameter.
    StateMismatch,
    /// State matched but no code came back (denied consent or `error`).
    MissingCode { error: Option<String> },
    NotFound,
    MethodNotAllowed,
}

impl CallbackOutcome {
    pub fn status(&self) -> u16 {
        match self {
            Self::Accepted => 200,
            Self::StateMismatch | Self::MissingCode { .. } => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Accepted => "Authorization code received",
            Self::StateMismatch => "State mismatch",
            Self::MissingCode { .. } => "No authorization code found.",
            Self::NotFound => "Not found",
            Self::MethodNotAllowed => "Method not allowed",
        }
    }

    pub fn into_error(self) -> Option<RelayError> {
        match self {
            Self::StateMismatch => Some(RelayError::StateMismatch),
            _ => None,
        }
    }
}

/// Validates redirect callbacks against the stored session.
#[derive(Debug, Clone)]
pub struct CallbackReceiver {
    state: PersistedState,
    path: String,
}

impl CallbackReceiver {
    /// Serve the path of the configured redirect URI.
    pub fn new(ctx: &AppContext) -> Self {
        let redirect = ctx.config.redirect_uri();
        let path = reqwest::Url::parse(&redirect)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| "/callback".to_string());
        Self::with_path(ctx.state.clone(), path)
    }

    pub fn with_path(state: PersistedState, path: impl Into<String>) -> Self {
        Self {
            state,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Handle one request line (`method` plus origin-form `target`).
    pub fn handle(&self, method: &str, target: &str) -> Result<CallbackOutcome> {
        let url = reqwest::Url::parse(&format!("http://localhost{target}"))
            .map_err(|err| RelayError::InvalidState(format!("bad request target: {err}")))?;
        if url.path() != self.path {
            return Ok(CallbackOutcome::NotFound);
        }
        if !method.eq_ignore_ascii_case("GET") {
            return Ok(CallbackOutcome::MethodNotAllowed);
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        let Some(session) = self.state.session()? else {
            tracing::warn!("callback arrived with no authorization session in progress");
            return Ok(CallbackOutcome::StateMismatch);
        };
        if !state
            .as_deref()
            .is_some_and(|candidate| session.matches_state(candidate))
        {
            tracing::warn!("callback state does not match the session nonce");
            return Ok(CallbackOutcome::StateMismatch);
        }

        match code.filter(|code| !code.is_empty()) {
            Some(code) if error.is_none() => {
                // The session record itself is never rewritten here, so a
                // teardown racing this write cannot bring the nonce back.
                self.state
                    .set_received_code(&ReceivedCode::new(session.state, code))?;
                tracing::info!("authorization code stored");
                Ok(CallbackOutcome::Accepted)
            }
            _ => {
                tracing::warn!(error = ?error, "callback carried no authorization code");
                Ok(CallbackOutcome::MissingCode { error })
            }
        }
    }

    /// Bind a listener for this receiver.
    pub async fn bind(self, addr: SocketAddr) -> Result<CallbackServer> {
        let listener = TcpListener::bind(addr).await?;
        Ok(CallbackServer {
            listener,
            receiver: self,
        })
    }
}

/// How a [`CallbackServer`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    CodeAccepted,
    Expired,
}

/// A bound loopback listener.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
    receiver: CallbackReceiver,
}

impl CallbackServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Answer requests until one code is accepted or `lifetime` elapses.
    ///
    /// Rejected callbacks and stray requests (favicon and the like) are
    /// answered and the server keeps listening.
    pub async fn serve(self, lifetime: Duration) -> Result<ServeOutcome> {
        let deadline = Instant::now() + lifetime;
        tracing::info!(
            addr = %self.local_addr()?,
            path = %self.receiver.path,
            "callback receiver listening"
        );
        loop {
            let accepted = tokio::time::timeout_at(deadline, self.listener.accept()).await;
            let (mut stream, peer) = match accepted {
                Ok(conn) => conn?,
                Err(_) => {
                    tracing::info!("callback receiver lifetime elapsed");
                    return Ok(ServeOutcome::Expired);
                }
            };
            match self.answer(&mut stream).await {
                Ok(CallbackOutcome::Accepted) => return Ok(ServeOutcome::CodeAccepted),
                Ok(outcome) => {
                    let status = outcome.status();
                    match outcome.into_error() {
                        Some(err) => {
                            tracing::warn!(peer = %peer, status, error = %err, "callback rejected")
                        }
                        None => tracing::debug!(peer = %peer, status, "callback answered"),
                    }
                }
                Err(err) => tracing::warn!(peer = %peer, error = %err, "callback connection failed"),
            }
        }
    }

    async fn answer(&self, stream: &mut TcpStream) -> Result<CallbackOutcome> {
        let request = tokio::time::timeout(READ_TIMEOUT, read_request_head(stream))
            .await
            .map_err(|_| RelayError::Timeout(READ_TIMEOUT.as_millis() as u64))??;
        let Some((method, target)) = parse_request_line(&request) else {
            write_response(stream, 400, "Bad request").await?;
            return Err(RelayError::InvalidState("malformed request line".into()));
        };

        match self.receiver.handle(method, target) {
            Ok(outcome) => {
                write_response(stream, outcome.status(), outcome.message()).await?;
                Ok(outcome)
            }
            Err(err) => {
                write_response(stream, 500, "Internal error").await?;
                Err(err)
            }
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.windows(4).any(|window| window == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES
        {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn parse_request_line(request: &str) -> Option<(&str, &str)> {
    let mut parts = request.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    target.starts_with('/').then_some((method, target))
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::AuthorizationSession;

    fn receiver_with_session(nonce: &str) -> CallbackReceiver {
        let state = PersistedState::in_memory();
        state
            .set_session(&AuthorizationSession::with_state(nonce))
            .unwrap();
        CallbackReceiver::with_path(state, "/callback")
    }

    #[test]
    fn matching_state_stores_code() {
        let receiver = receiver_with_session("N");
        let outcome = receiver.handle("GET", "/callback?code=abc&state=N").unwrap();
        assert_eq!(outcome, CallbackOutcome::Accepted);
        assert_eq!(outcome.status(), 200);
        assert_eq!(receiver.state.pending_code().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn wrong_state_is_rejected_without_writing() {
        let receiver = receiver_with_session("N");
        let outcome = receiver
            .handle("GET", "/callback?code=X&state=WRONG")
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::StateMismatch);
        assert_eq!(outcome.message(), "State mismatch");
        assert!(receiver.state.pending_code().unwrap().is_none());
    }

    #[test]
    fn only_state_mismatch_maps_to_an_error() {
        let err = CallbackOutcome::StateMismatch.into_error().unwrap();
        assert!(matches!(err, RelayError::StateMismatch));
        assert_eq!(err.status(), Some(400));
        assert!(CallbackOutcome::NotFound.into_error().is_none());
        assert!(CallbackOutcome::MissingCode { error: None }
            .into_error()
            .is_none());
    }

    #[test]
    fn missing_state_is_a_mismatch() {
        let receiver = receiver_with_session("N");
        let outcome = receiver.handle("GET", "/callback?code=X").unwrap();
        assert_eq!(outcome, CallbackOutcome::StateMismatch);
    }

    #[test]
    fn no_session_rejects_any_state() {
        let receiver = CallbackReceiver::with_path(PersistedState::in_memory(), "/callback");
        let outcome = receiver.handle("GET", "/callback?code=X&state=N").unwrap();
        assert_eq!(outcome, CallbackOutcome::StateMismatch);
        assert!(receiver.state.session().unwrap().is_none());
    }

    #[test]
    fn denied_consent_leaves_session_untouched() {
        let receiver = receiver_with_session("N");
        let before = receiver.state.session().unwrap();
        let outcome = receiver
            .handle("GET", "/callback?error=access_denied&state=N")
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::MissingCode {
                error: Some("access_denied".into())
            }
        );
        assert_eq!(outcome.status(), 400);
        assert_eq!(receiver.state.session().unwrap(), before);
    }

    #[test]
    fn accepted_code_leaves_session_record_alone() {
        let receiver = receiver_with_session("N");
        let before = receiver.state.session().unwrap();
        receiver.handle("GET", "/callback?code=abc&state=N").unwrap();
        assert_eq!(receiver.state.session().unwrap(), before);
        let stored = receiver.state.received_code().unwrap().unwrap();
        assert_eq!((stored.state.as_str(), stored.code.as_str()), ("N", "abc"));
    }

    #[test]
    fn late_callback_is_rejected_even_with_a_stray_code_record() {
        let receiver = receiver_with_session("N");
        receiver.state.clear_session().unwrap();
        receiver
            .state
            .set_received_code(&ReceivedCode::new("N", "raced"))
            .unwrap();

        let outcome = receiver.handle("GET", "/callback?code=again&state=N").unwrap();
        assert_eq!(outcome, CallbackOutcome::StateMismatch);
        assert!(receiver.state.session().unwrap().is_none());
        assert_eq!(receiver.state.received_code().unwrap().unwrap().code, "raced");
    }

    #[test]
    fn second_callback_overwrites_pending_code() {
        let receiver = receiver_with_session("N");
        receiver.handle("GET", "/callback?code=first&state=N").unwrap();
        receiver.handle("GET", "/callback?code=second&state=N").unwrap();
        assert_eq!(receiver.state.pending_code().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn other_paths_and_methods_are_refused() {
        let receiver = receiver_with_session("N");
        assert_eq!(
            receiver.handle("GET", "/favicon.ico").unwrap(),
            CallbackOutcome::NotFound
        );
        assert_eq!(
            receiver.handle("POST", "/callback?code=a&state=N").unwrap(),
            CallbackOutcome::MethodNotAllowed
        );
        assert!(receiver.state.pending_code().unwrap().is_none());
    }

    #[test]
    fn url_encoded_values_are_decoded() {
        let receiver = receiver_with_session("a b");
        let outcome = receiver
            .handle("GET", "/callback?code=x%2Fy&state=a%20b")
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Accepted);
        assert_eq!(receiver.state.pending_code().unwrap().as_deref(), Some("x/y"));
    }

    #[test]
    fn request_line_parsing() {
        assert_eq!(
            parse_request_line("GET /callback?code=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("GET", "/callback?code=1"))
        );
        assert_eq!(parse_request_line("GARBAGE"), None);
        assert_eq!(parse_request_line("GET http://evil/ HTTP/1.1"), None);
    }

    #[test]
    fn receiver_follows_configured_redirect_path() {
        let mut config = crate::config::RelayConfig::default();
        config.redirect_uri = Some("http://127.0.0.1:7000/oauth/done".into());
        let ctx = AppContext::new(
            config,
            PersistedState::in_memory(),
            crate::http::HttpClient::new().unwrap(),
        );
        assert_eq!(CallbackReceiver::new(&ctx).path(), "/oauth/done");
    }

    #[tokio::test]
    async fn server_binds_the_redirect_uri_port() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = crate::config::RelayConfig::default();
        config.redirect_uri = Some(format!("http://127.0.0.1:{port}/oauth/done"));
        let ctx = AppContext::new(
            config,
            PersistedState::in_memory(),
            crate::http::HttpClient::new().unwrap(),
        );

        let server = CallbackReceiver::new(&ctx)
            .bind(ctx.config.callback_addr().unwrap())
            .await
            .unwrap();
        assert_eq!(server.local_addr().unwrap().port(), port);
    }
}

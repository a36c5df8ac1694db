use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One in-flight authorization attempt.
///
/// Only the coordinator writes this record. The callback receiver reads it
/// and writes a separate [`ReceivedCode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSession {
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationSession {
    /// Start a session with a newly generated nonce.
    pub fn start() -> Self {
        Self::with_state(generate_state())
    }

    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            created_at: Utc::now(),
        }
    }

    /// Compare a callback `state` against this session's nonce.
    pub fn matches_state(&self, candidate: &str) -> bool {
        constant_time_eq(self.state.as_bytes(), candidate.as_bytes())
    }

    /// Whether `code` was delivered for this session's nonce.
    pub fn owns(&self, code: &ReceivedCode) -> bool {
        self.matches_state(&code.state)
    }
}

/// Authorization code dropped by the callback receiver, tagged with the
/// nonce it was accepted for.
///
/// A code only counts while a session with the same nonce exists, so a record
/// that outlives its session is inert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedCode {
    pub state: String,
    pub code: String,
    pub received_at: DateTime<Utc>,
}

impl ReceivedCode {
    pub fn new(state: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code: code.into(),
            received_at: Utc::now(),
        }
    }
}

/// Random nonce for the `state` parameter: 32 lowercase hex characters.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Phases of one authorization-code attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    AwaitingRedirect,
    CodeReceived,
    TimedOut,
    Exchanging,
    Authorized,
    Failed,
}

impl AuthPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: AuthPhase) -> bool {
        use AuthPhase::*;
        matches!(
            (self, next),
            (Idle, AwaitingRedirect)
                | (AwaitingRedirect, CodeReceived)
                | (AwaitingRedirect, TimedOut)
                | (CodeReceived, Exchanging)
                | (Exchanging, Authorized)
                | (Exchanging, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthPhase::TimedOut | AuthPhase::Authorized | AuthPhase::Failed
        )
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::CodeReceived => "code_received",
            Self::TimedOut => "timed_out",
            Self::Exchanging => "exchanging",
            Self::Authorized => "authorized",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

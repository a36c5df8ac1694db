use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Application client id and secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub id: String,
    pub secret: String,
}

impl ClientCredentials {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("id", &self.id)
            .field("secret", &"..")
            .finish()
    }
}

/// Token endpoint response body (RFC 6749 section 5.1).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Absolute expiry for a token issued at `now` with lifetime `expires_in`.
pub fn expires_at(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in)
}

/// Application-level credential from the client-credentials grant.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use tokenrelay::auth::AppAccessToken;
///
/// let now = Utc::now();
/// let token = AppAccessToken {
///     access_token: "abc".to_string(),
///     token_type: "Bearer".to_string(),
///     expires_at: now + Duration::seconds(3600),
/// };
/// assert!(token.is_usable_at(now, Duration::seconds(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl AppAccessToken {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expires_at(now, response.expires_in),
            access_token: response.access_token,
            token_type: response.token_type,
        }
    }

    /// Whether the token can still be handed out at `now`, keeping `skew`
    /// in reserve before the absolute expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }
}

/// User-level credential from the authorization-code grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl UserAccessToken {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expires_at(now, response.expires_in),
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            scope: response.scope,
        }
    }

    /// Build the record that replaces `self` after a successful refresh.
    ///
    /// Servers may omit `refresh_token` when it did not rotate; the previous
    /// one is kept in that case.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let previous = self.refresh_token.clone();
        let mut next = Self::from_response(response, now);
        if next.refresh_token.is_none() {
            next.refresh_token = previous;
        }
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        next
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

use crate::auth::token::{ClientCredentials, TokenResponse};
use crate::error::{RelayError, Result};
use crate::http::HttpClient;

/// Form-encoded requests against the token endpoint.
///
/// Every grant sends `client_id` and `client_secret` in the body. Any status
/// other than 200 becomes [`RelayError::Auth`] with the raw response body.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: HttpClient,
    token_url: String,
    credentials: ClientCredentials,
}

impl TokenEndpoint {
    pub fn new(http: HttpClient, token_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub async fn client_credentials(&self) -> Result<TokenResponse> {
        self.request("client_credentials", &[]).await
    }

    pub async fn authorization_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        self.request(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.request("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }

    async fn request(&self, grant_type: &str, extra: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form = vec![("grant_type", grant_type)];
        form.extend_from_slice(extra);
        form.push(("client_id", self.credentials.id.as_str()));
        form.push(("client_secret", self.credentials.secret.as_str()));

        let resp = self.http.post_form(&self.token_url, &form).await?;
        if !resp.is_ok() {
            tracing::error!(
                grant_type,
                status = resp.status,
                body = %resp.body,
                "token request rejected"
            );
            return Err(RelayError::auth(resp.status, resp.body));
        }
        resp.json()
    }
}

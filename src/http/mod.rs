//! Thin HTTP layer over `reqwest`: status plus parsed body, nothing more.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::error::{RelayError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status code and body of a completed request.
///
/// Non-JSON bodies are kept as a JSON string so error payloads can always be
/// logged and carried in [`RelayError`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// HTTP client used for the token endpoint and the resource API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { inner })
    }

    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// POST a form-encoded body.
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let resp = self
            .inner
            .post(url)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;
        into_response(resp).await
    }

    /// GET with extra headers and query parameters.
    pub async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let mut request = self.inner.get(url).headers(headers.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        let resp = request.send().await?;
        into_response(resp).await
    }
}

/// Build an `Authorization: Bearer` header map.
pub fn bearer_headers(access_token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let value = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| RelayError::InvalidState("access token is not a valid header value".into()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

async fn into_response(resp: reqwest::Response) -> Result<HttpResponse> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    Ok(HttpResponse {
        status,
        body: parse_body(&text),
    })
}

fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_body_keeps_json() {
        assert_eq!(parse_body(r#"{"error":"x"}"#), json!({"error": "x"}));
    }

    #[test]
    fn parse_body_wraps_plain_text() {
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn parse_body_maps_empty_to_null() {
        assert_eq!(parse_body("  "), serde_json::Value::Null);
    }

    #[test]
    fn bearer_headers_sets_authorization() {
        let headers = bearer_headers("tok").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn bearer_headers_rejects_control_characters() {
        assert!(bearer_headers("bad\ntoken").is_err());
    }
}

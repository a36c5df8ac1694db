//! Paginated pulls from collection endpoints that answer
//! `{ "items": [...], "next": "<url>" | null }`.

use std::collections::HashSet;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::http::HttpClient;

/// One page of a collection.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Items gathered by [`PaginatedFetcher::collect`].
///
/// `interrupted` holds the failure that stopped pagination early; the items
/// gathered before it are kept.
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub pages: usize,
    pub interrupted: Option<RelayError>,
}

impl<T> Collected<T> {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Follows `next` links and accumulates items in server order.
#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    http: HttpClient,
}

impl PaginatedFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Every item reachable from `initial_url`.
    ///
    /// `query` only applies to the first request; `next` links are used as
    /// given, and a link to a page already fetched ends the pull. A failed
    /// page ends pagination and the items collected so far are returned, see
    /// [`collect`](Self::collect) to tell the two apart.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        initial_url: &str,
        headers: &HeaderMap,
        query: &[(&str, &str)],
    ) -> Vec<T> {
        self.collect(initial_url, headers, query).await.into_items()
    }

    pub async fn collect<T: DeserializeOwned>(
        &self,
        initial_url: &str,
        headers: &HeaderMap,
        query: &[(&str, &str)],
    ) -> Collected<T> {
        let mut collected = Collected {
            items: Vec::new(),
            pages: 0,
            interrupted: None,
        };
        let mut visited = HashSet::new();
        let mut next = Some(initial_url.to_string());

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::warn!(url = %url, "next link revisits an earlier page, stopping");
                break;
            }
            let params: &[(&str, &str)] = if collected.pages == 0 { query } else { &[] };
            let page = match self.page::<T>(&url, headers, params).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(
                        url = %url,
                        page = collected.pages + 1,
                        collected = collected.items.len(),
                        status = ?err.status(),
                        error = %err,
                        "pagination stopped early"
                    );
                    collected.interrupted = Some(err);
                    break;
                }
            };
            collected.pages += 1;
            collected.items.extend(page.items);
            next = page.next.filter(|link| !link.is_empty());
        }

        tracing::debug!(
            url = %initial_url,
            pages = collected.pages,
            items = collected.items.len(),
            "pagination finished"
        );
        collected
    }

    /// Single GET without pagination. Any non-200 is an error.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self.http.get(url, headers, query).await?;
        if !resp.is_ok() {
            tracing::error!(url = %url, status = resp.status, body = %resp.body, "request failed");
            return Err(RelayError::fetch(url, resp.status, resp.body));
        }
        resp.json()
    }

    async fn page<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
        query: &[(&str, &str)],
    ) -> Result<Page<T>> {
        let resp = self.http.get(url, headers, query).await?;
        if !resp.is_ok() {
            tracing::warn!(url = %url, status = resp.status, body = %resp.body, "page request failed");
            return Err(RelayError::fetch(url, resp.status, resp.body));
        }
        resp.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_defaults_missing_fields() {
        let page: Page<serde_json::Value> = serde_json::from_value(json!({})).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn page_accepts_null_next() {
        let page: Page<u32> =
            serde_json::from_value(json!({"items": [1, 2], "next": null})).unwrap();
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.next.is_none());
    }
}

//! CLI handler for `tokenrelay fetch`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::{BrowserLauncher, TokenManager};
use crate::context::AppContext;
use crate::error::{RelayError, Result};
use crate::fetch::PaginatedFetcher;
use crate::http::bearer_headers;

use super::FetchArgs;

/// Handle `tokenrelay fetch <target>`.
pub async fn handle_fetch(
    ctx: &AppContext,
    browser: Arc<dyn BrowserLauncher>,
    args: &FetchArgs,
) -> Result<()> {
    if let Some(out) = &args.out {
        if out.exists() && !args.refresh {
            tracing::info!(path = %out.display(), "output exists, skipping fetch");
            println!("📁 {} already exists (use --refresh to fetch again)", out.display());
            return Ok(());
        }
    }

    let manager = TokenManager::new(ctx, browser)?;
    let token = manager.user_token().await?;
    let headers = bearer_headers(&token.access_token)?;
    let url = resolve_url(&ctx.config.endpoints.api, &args.target);
    let limit = args.limit.map(|limit| limit.to_string());
    let query: Vec<(&str, &str)> = limit
        .as_deref()
        .map(|limit| vec![("limit", limit)])
        .unwrap_or_default();

    let fetcher = PaginatedFetcher::new(ctx.http.clone());
    let result = if args.single {
        fetcher.fetch_one::<Value>(&url, &headers, &query).await?
    } else {
        let collected = fetcher.collect::<Value>(&url, &headers, &query).await;
        if let Some(err) = collected.interrupted {
            if args.strict {
                return Err(err);
            }
            eprintln!(
                "⚠️  Stopped after {} page(s): {err}. Keeping {} item(s).",
                collected.pages,
                collected.items.len()
            );
        }
        Value::Array(collected.items)
    };

    match &args.out {
        Some(out) => {
            write_json(out, &result)?;
            let count = result.as_array().map_or(1, Vec::len);
            println!("✅ Wrote {count} item(s) to {}", out.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

/// Absolute URLs are used as given; anything else is joined onto the API base.
pub fn resolve_url(api_base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        api_base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).map_err(|e| {
        RelayError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to write {}: {e}", path.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn relative_targets_join_the_api_base() {
        assert_eq!(
            resolve_url("https://api.example.com/v1/", "/me/tracks"),
            "https://api.example.com/v1/me/tracks"
        );
        assert_eq!(
            resolve_url("https://api.example.com/v1", "me"),
            "https://api.example.com/v1/me"
        );
    }

    #[test]
    fn absolute_targets_are_kept() {
        assert_eq!(
            resolve_url("https://api.example.com/v1", "http://other.test/x?offset=5"),
            "http://other.test/x?offset=5"
        );
    }

    #[test]
    fn write_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &json!([{"id": 1}])).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!([{"id": 1}]));
    }
}

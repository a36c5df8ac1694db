//! tokenrelay: OAuth2 token lifecycle for a command-line client.
//!
//! Keeps an application token (client-credentials grant) and a user token
//! (authorization-code grant with refresh) in persisted state, hands the
//! authorization code from a loopback callback receiver to the process that
//! is waiting for it, and pulls `next`-linked collections from the API.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenrelay::prelude::*;
//!
//! # async fn example() -> tokenrelay::error::Result<()> {
//! let ctx = AppContext::from_config(RelayConfig::load_from_path("config.toml")?)?;
//! let manager = TokenManager::new(&ctx, Arc::new(SystemBrowser))?;
//! let user = manager.user_token().await?;
//!
//! let fetcher = PaginatedFetcher::new(ctx.http.clone());
//! let headers = tokenrelay::http::bearer_headers(&user.access_token)?;
//! let saved: Vec<serde_json::Value> = fetcher
//!     .fetch_all("https://api.spotify.com/v1/me/tracks", &headers, &[("limit", "50")])
//!     .await;
//! println!("{} items", saved.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod http;
pub mod prelude;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

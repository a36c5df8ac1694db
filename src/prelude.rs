//! Convenience re-exports for common use.

pub use crate::auth::{
    AppAccessToken, AuthorizationCoordinator, BrowserLauncher, CallbackReceiver, PrintUrl,
    SystemBrowser, TokenManager, UserAccessToken,
};
pub use crate::config::{PollingPolicy, RelayConfig};
pub use crate::context::AppContext;
pub use crate::error::{RelayError, Result};
pub use crate::fetch::{Collected, PaginatedFetcher};
pub use crate::http::HttpClient;
pub use crate::store::{PersistedState, StateStore};

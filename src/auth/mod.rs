//! OAuth2 credential lifecycle.
//!
//! - [`TokenManager`]: app token (client credentials, cached until the skew
//!   window) and user token (authorization code, refreshed on every call).
//! - [`AuthorizationCoordinator`]: browser redirect plus bounded polling of
//!   persisted state for the code dropped by the callback receiver.
//! - [`CallbackReceiver`]: the loopback endpoint that validates `state` and
//!   writes the code.

pub mod browser;
pub mod callback;
pub mod coordinator;
pub mod grant;
pub mod manager;
pub mod session;
pub mod token;

pub use browser::{BrowserLauncher, PrintUrl, SystemBrowser};
pub use callback::{CallbackOutcome, CallbackReceiver, CallbackServer, ServeOutcome};
pub use coordinator::AuthorizationCoordinator;
pub use grant::TokenEndpoint;
pub use manager::TokenManager;
pub use session::{generate_state, AuthPhase, AuthorizationSession, ReceivedCode};
pub use token::{AppAccessToken, ClientCredentials, TokenResponse, UserAccessToken};

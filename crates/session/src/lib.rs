//! Storefront session client.
//!
//! Keeps a customer signed in to the platform REST API: acquires and persists
//! tokens, refreshes them on demand with at most one refresh in flight, and
//! retries a credentialed request once when it comes back 401.
//!
//! ```text
//! SessionClient ──► RequestExecutor ──► HttpTransport ──► platform
//!                        │    ▲
//!                   401  ▼    │ new tokens
//!                  RefreshCoordinator ──► TokenStore ──► SessionStore
//! ```
//!
//! The composition root builds a [`SessionClient`] from an
//! `Arc<dyn HttpTransport>` and an `Arc<dyn SessionStore>`, or from a
//! [`SessionConfig`] with [`SessionClient::from_config`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod keeper;
pub mod refresh;
pub mod session;
pub mod store;
pub mod tokens;
pub mod transport;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use api::{ProfileUpdate, Registration, SocialProvider, TwoFactorSetup};
pub use config::{ConfigError, PlatformConfig, SessionConfig};
pub use error::SessionError;
pub use executor::RequestExecutor;
pub use keeper::SessionKeeper;
pub use refresh::{RefreshCoordinator, RefreshError};
pub use session::SessionClient;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError, StoreKeys};
pub use tokens::{SessionState, TokenStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError};

pub use storefront_session_core::{AuthTokens, Email, UserProfile};

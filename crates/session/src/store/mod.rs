//! Persistent session storage.
//!
//! The session layer mirrors its state into a small string key-value store
//! that survives process restarts. The store is treated as synchronous and
//! provides no locking of its own; [`crate::tokens::TokenStore`] serializes
//! every access to it.
//!
//! # Implementations
//!
//! - [`MemorySessionStore`] - process-local, for tests and throwaway sessions
//! - [`FileSessionStore`] - a JSON file on disk

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use thiserror::Error;

/// Errors raised by a [`SessionStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing data could not be (de)serialized.
    #[error("session store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String key-value storage that outlives the process.
pub trait SessionStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// The two keys the session occupies in a [`SessionStore`].
///
/// Tokens and profile live under separate keys so they can be read and
/// written independently, but they are always removed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    /// Key for the serialized `AuthTokens`.
    pub tokens: String,
    /// Key for the serialized `UserProfile`.
    pub profile: String,
}

impl StoreKeys {
    /// Default key for the serialized tokens.
    pub const TOKENS: &'static str = "auth_tokens";

    /// Default key for the serialized profile.
    pub const PROFILE: &'static str = "user_profile";

    /// Keys namespaced with `prefix`, e.g. `shop1:auth_tokens`.
    ///
    /// An empty prefix yields the default keys.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        if prefix.is_empty() {
            return Self::default();
        }
        Self {
            tokens: format!("{prefix}:{}", Self::TOKENS),
            profile: format!("{prefix}:{}", Self::PROFILE),
        }
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            tokens: Self::TOKENS.to_string(),
            profile: Self::PROFILE.to_string(),
        }
    }
}

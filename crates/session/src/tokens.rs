//! In-memory token and profile state, mirrored to a [`SessionStore`].
//!
//! Memory is authoritative once [`TokenStore::load`] has run. Every mutation
//! happens inside one synchronous critical section that also writes the
//! mirror, so no reader ever sees tokens without the matching persisted
//! state. The lock is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use storefront_session_core::{AuthTokens, UserProfile};

use crate::store::{SessionStore, StoreKeys};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// [`TokenStore::load`] hasn't run and nothing has been saved yet.
    Uninitialized,
    /// Valid tokens are held.
    Authenticated,
    /// No tokens, or tokens past their usable lifetime.
    Unauthenticated,
}

#[derive(Default)]
struct Inner {
    initialized: bool,
    tokens: Option<AuthTokens>,
    profile: Option<UserProfile>,
}

/// Owner of the current [`AuthTokens`] and cached [`UserProfile`].
pub struct TokenStore {
    store: Arc<dyn SessionStore>,
    keys: StoreKeys,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys", &self.keys)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Create an uninitialized token store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, keys: StoreKeys) -> Self {
        Self {
            store,
            keys,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore the session from the persisted mirror.
    ///
    /// Valid tokens are adopted along with the cached profile. Anything else
    /// (missing, unparseable, expired) clears both keys. Store failures are
    /// logged and treated as "no session".
    pub fn load(&self) -> SessionState {
        self.load_at(Utc::now())
    }

    pub(crate) fn load_at(&self, now: DateTime<Utc>) -> SessionState {
        let mut inner = self.lock();
        inner.initialized = true;

        let restored = match self.store.get(&self.keys.tokens) {
            Ok(Some(raw)) => match serde_json::from_str::<AuthTokens>(&raw) {
                Ok(tokens) if tokens.is_valid_at(now) => Some(tokens),
                Ok(_) => {
                    tracing::debug!("Stored session has expired");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable stored tokens");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored tokens");
                None
            }
        };

        if let Some(tokens) = restored {
            inner.profile = self.read_profile();
            inner.tokens = Some(tokens);
            tracing::info!(
                has_profile = inner.profile.is_some(),
                "Restored stored session"
            );
            SessionState::Authenticated
        } else {
            inner.tokens = None;
            inner.profile = None;
            self.remove_persisted();
            SessionState::Unauthenticated
        }
    }

    fn read_profile(&self) -> Option<UserProfile> {
        match self.store.get(&self.keys.profile) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .inspect_err(|e| tracing::warn!(error = %e, "Discarding unreadable stored profile"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored profile");
                None
            }
        }
    }

    /// Replace the current tokens and persist them.
    pub fn save(&self, tokens: AuthTokens) {
        let mut inner = self.lock();
        self.write_tokens(&mut inner, tokens);
    }

    /// Replace tokens and profile together (sign-in).
    pub fn save_session(&self, tokens: AuthTokens, profile: Option<UserProfile>) {
        let mut inner = self.lock();
        self.write_tokens(&mut inner, tokens);
        match profile {
            Some(profile) => self.write_profile(&mut inner, profile),
            None => {
                inner.profile = None;
                self.remove_key(&self.keys.profile);
            }
        }
    }

    /// Replace the tokens only if the refresh token is still `expected`.
    ///
    /// Returns `false` (and changes nothing) when the session was cleared or
    /// replaced by a new sign-in while the refresh was running.
    pub fn replace_if_current(&self, expected_refresh_token: &str, tokens: AuthTokens) -> bool {
        let mut inner = self.lock();
        if inner.tokens.as_ref().map(|t| t.refresh_token.as_str()) != Some(expected_refresh_token) {
            return false;
        }
        self.write_tokens(&mut inner, tokens);
        true
    }

    fn write_tokens(&self, inner: &mut Inner, tokens: AuthTokens) {
        match serde_json::to_string(&tokens) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.keys.tokens, &raw) {
                    tracing::warn!(error = %e, "Failed to persist tokens");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize tokens"),
        }
        inner.initialized = true;
        inner.tokens = Some(tokens);
    }

    /// Replace the cached profile and persist it.
    pub fn save_profile(&self, profile: UserProfile) {
        let mut inner = self.lock();
        self.write_profile(&mut inner, profile);
    }

    /// Apply `f` to the cached profile, if any, and persist the result.
    pub fn update_profile(&self, f: impl FnOnce(&mut UserProfile)) {
        let mut inner = self.lock();
        if let Some(mut profile) = inner.profile.take() {
            f(&mut profile);
            self.write_profile(&mut inner, profile);
        }
    }

    fn write_profile(&self, inner: &mut Inner, profile: UserProfile) {
        match serde_json::to_string(&profile) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.keys.profile, &raw) {
                    tracing::warn!(error = %e, "Failed to persist profile");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize profile"),
        }
        inner.profile = Some(profile);
    }

    /// Drop tokens and profile from memory and from the mirror.
    pub fn clear(&self) {
        let mut inner = self.lock();
        self.clear_locked(&mut inner);
    }

    /// Clear the session only if the refresh token is still `expected`.
    ///
    /// Returns whether anything was cleared.
    pub fn clear_if_current(&self, expected_refresh_token: &str) -> bool {
        let mut inner = self.lock();
        if inner.tokens.as_ref().map(|t| t.refresh_token.as_str()) != Some(expected_refresh_token) {
            return false;
        }
        self.clear_locked(&mut inner);
        true
    }

    fn clear_locked(&self, inner: &mut Inner) {
        inner.initialized = true;
        inner.tokens = None;
        inner.profile = None;
        self.remove_persisted();
    }

    fn remove_persisted(&self) {
        self.remove_key(&self.keys.tokens);
        self.remove_key(&self.keys.profile);
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "Failed to remove stored session key");
        }
    }

    /// Whether `tokens` are present and usable right now.
    #[must_use]
    pub fn is_valid(tokens: Option<&AuthTokens>) -> bool {
        tokens.is_some_and(AuthTokens::is_valid)
    }

    /// Whether the current tokens are usable.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        Self::is_valid(self.lock().tokens.as_ref())
    }

    /// Whether any tokens are held, usable or not.
    #[must_use]
    pub fn has_tokens(&self) -> bool {
        self.lock().tokens.is_some()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        if !inner.initialized {
            SessionState::Uninitialized
        } else if Self::is_valid(inner.tokens.as_ref()) {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Snapshot of the current tokens.
    #[must_use]
    pub fn current(&self) -> Option<AuthTokens> {
        self.lock().tokens.clone()
    }

    /// The current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock().tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// The current refresh token, if non-empty.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.lock()
            .tokens
            .as_ref()
            .filter(|t| t.can_refresh())
            .map(|t| t.refresh_token.clone())
    }

    /// Snapshot of the cached profile.
    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.lock().profile.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use chrono::Duration;

    fn tokens(access: &str, refresh: &str, expires_in: i64) -> AuthTokens {
        AuthTokens::issue(access, refresh, None, expires_in, Utc::now()).unwrap()
    }

    fn token_store(backing: &Arc<MemorySessionStore>) -> TokenStore {
        TokenStore::new(backing.clone(), StoreKeys::default())
    }

    #[test]
    fn test_starts_uninitialized() {
        let store = token_store(&Arc::new(MemorySessionStore::new()));
        assert_eq!(store.state(), SessionState::Uninitialized);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_save_then_load_restores_valid_session() {
        let backing = Arc::new(MemorySessionStore::new());
        let first = token_store(&backing);
        first.save_session(tokens("a", "r", 3600), Some(UserProfile::with_id("u1")));

        let restarted = token_store(&backing);
        assert_eq!(restarted.load(), SessionState::Authenticated);
        assert!(restarted.is_authenticated());
        assert_eq!(restarted.current().unwrap().access_token, "a");
        assert_eq!(restarted.profile().unwrap().id.as_str(), "u1");
    }

    #[test]
    fn test_load_discards_expiring_session() {
        let backing = Arc::new(MemorySessionStore::new());
        // Inside the safety margin: usable lifetime already over
        token_store(&backing).save_session(tokens("a", "r", 120), Some(UserProfile::with_id("u1")));

        let restarted = token_store(&backing);
        assert_eq!(restarted.load(), SessionState::Unauthenticated);
        assert!(restarted.current().is_none());
        assert!(restarted.profile().is_none());
        assert!(backing.is_empty());
    }

    #[test]
    fn test_load_at_respects_margin() {
        let backing = Arc::new(MemorySessionStore::new());
        let saved = tokens("a", "r", 3600);
        token_store(&backing).save(saved.clone());

        let deadline = saved.expires_at - AuthTokens::safety_margin();

        let restarted = token_store(&backing);
        assert_eq!(
            restarted.load_at(deadline - Duration::seconds(1)),
            SessionState::Authenticated
        );

        let restarted = token_store(&backing);
        assert_eq!(restarted.load_at(deadline), SessionState::Unauthenticated);
        assert!(backing.is_empty());
    }

    #[test]
    fn test_load_discards_corrupt_mirror() {
        let backing = Arc::new(MemorySessionStore::new());
        backing.set(StoreKeys::TOKENS, "{not json").unwrap();
        backing.set(StoreKeys::PROFILE, "{}").unwrap();

        let store = token_store(&backing);
        assert_eq!(store.load(), SessionState::Unauthenticated);
        assert!(backing.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let backing = Arc::new(MemorySessionStore::new());
        let store = token_store(&backing);
        store.save_session(tokens("a", "r", 3600), Some(UserProfile::with_id("u1")));
        assert_eq!(backing.len(), 2);

        store.clear();
        assert_eq!(store.state(), SessionState::Unauthenticated);
        assert!(store.current().is_none());
        assert!(store.profile().is_none());
        assert!(backing.is_empty());
    }

    #[test]
    fn test_replace_if_current_guards_against_new_session() {
        let store = token_store(&Arc::new(MemorySessionStore::new()));
        store.save(tokens("a1", "r1", 3600));

        assert!(store.replace_if_current("r1", tokens("a2", "r2", 3600)));
        assert_eq!(store.current().unwrap().access_token, "a2");

        assert!(!store.replace_if_current("r1", tokens("a3", "r3", 3600)));
        assert_eq!(store.current().unwrap().access_token, "a2");

        store.clear();
        assert!(!store.replace_if_current("r2", tokens("a4", "r4", 3600)));
        assert!(store.current().is_none());
    }

    #[test]
    fn test_clear_if_current() {
        let store = token_store(&Arc::new(MemorySessionStore::new()));
        store.save(tokens("a1", "r1", 3600));

        assert!(!store.clear_if_current("other"));
        assert!(store.has_tokens());
        assert!(store.clear_if_current("r1"));
        assert!(!store.has_tokens());
    }

    #[test]
    fn test_update_profile_persists() {
        let backing = Arc::new(MemorySessionStore::new());
        let store = token_store(&backing);
        store.save_session(tokens("a", "r", 3600), Some(UserProfile::with_id("u1")));

        store.update_profile(|p| p.two_factor_enabled = true);

        let restarted = token_store(&backing);
        restarted.load();
        assert!(restarted.profile().unwrap().two_factor_enabled);
    }

    #[test]
    fn test_is_valid_requires_tokens() {
        assert!(!TokenStore::is_valid(None));
        assert!(TokenStore::is_valid(Some(&tokens("a", "r", 3600))));
        assert!(!TokenStore::is_valid(Some(&tokens("", "r", 3600))));
    }

    #[test]
    fn test_refresh_token_ignores_empty() {
        let store = token_store(&Arc::new(MemorySessionStore::new()));
        store.save(tokens("a", "", 3600));
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.access_token().as_deref(), Some("a"));
    }
}

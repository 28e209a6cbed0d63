//! Platform access credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds before the nominal expiry at which a token stops being used.
///
/// A request started just before expiry must not race the server-side expiry
/// while it is in transit.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// Authorization scheme used when the platform doesn't name one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Errors building [`AuthTokens`] from a platform grant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// `expires_in` is past what a timestamp can hold.
    #[error("token lifetime of {0}s is out of range")]
    ExpiryOutOfRange(i64),
}

/// A complete set of credentials issued by the platform.
///
/// `expires_at` is fixed when the tokens are received and never recomputed,
/// so a value restored from storage keeps its original deadline.
///
/// `Debug` is implemented manually to redact both tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Short-lived bearer credential.
    pub access_token: String,
    /// Credential used only to obtain a new access token.
    pub refresh_token: String,
    /// Authorization scheme, e.g. `Bearer`.
    pub token_type: String,
    /// Lifetime in seconds as reported by the platform.
    pub expires_in: i64,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Build tokens from a platform grant received at `issued_at`.
    ///
    /// A missing or blank `token_type` falls back to [`DEFAULT_TOKEN_TYPE`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ExpiryOutOfRange`] if `issued_at + expires_in`
    /// can't be represented.
    pub fn issue(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: Option<&str>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or(TokenError::ExpiryOutOfRange(expires_in))?;
        let token_type = token_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TOKEN_TYPE);

        Ok(Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: token_type.to_owned(),
            expires_in,
            expires_at,
        })
    }

    /// The safety margin as a `chrono` duration.
    #[must_use]
    pub fn safety_margin() -> Duration {
        Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS)
    }

    /// Whether the tokens can still be used at `now`.
    ///
    /// Requires a non-empty access token and an expiry strictly more than
    /// [`EXPIRY_SAFETY_MARGIN_SECS`] after `now`. An expiry too close to the
    /// minimum timestamp to subtract the margin from is never valid.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .checked_sub_signed(Self::safety_margin())
                .is_some_and(|deadline| now < deadline)
    }

    /// Whether the tokens can still be used right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether a refresh token is available.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Value for the `Authorization` header: `<token_type> <access_token>`.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens_expiring_at(expires_at: DateTime<Utc>) -> AuthTokens {
        AuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            expires_at,
        }
    }

    #[test]
    fn test_issue_derives_expiry_from_issue_time() {
        let t0 = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let tokens = AuthTokens::issue("a", "r", None, 3600, t0).unwrap();

        assert_eq!(tokens.expires_at, t0 + Duration::seconds(3600));
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[test]
    fn test_issue_keeps_platform_token_type() {
        let tokens = AuthTokens::issue("a", "r", Some("MAC"), 60, Utc::now()).unwrap();
        assert_eq!(tokens.authorization(), "MAC a");

        let blank = AuthTokens::issue("a", "r", Some("  "), 60, Utc::now()).unwrap();
        assert_eq!(blank.authorization(), "Bearer a");
    }

    #[test]
    fn test_issue_rejects_unrepresentable_lifetime() {
        let now = Utc::now();
        assert_eq!(
            AuthTokens::issue("a", "r", None, i64::MAX, now),
            Err(TokenError::ExpiryOutOfRange(i64::MAX))
        );
        // Fits in a duration, but not once added to `now`
        let huge = i64::MAX / 1000;
        assert!(AuthTokens::issue("a", "r", None, huge, now).is_err());
    }

    #[test]
    fn test_extreme_stored_expiry_is_invalid_not_a_panic() {
        let now = Utc::now();
        assert!(!tokens_expiring_at(DateTime::<Utc>::MIN_UTC).is_valid_at(now));
        assert!(tokens_expiring_at(DateTime::<Utc>::MAX_UTC).is_valid_at(now));
    }

    #[test]
    fn test_valid_one_second_before_margin() {
        let now = Utc::now();
        let tokens = tokens_expiring_at(now + AuthTokens::safety_margin() + Duration::seconds(1));
        assert!(tokens.is_valid_at(now));
    }

    #[test]
    fn test_invalid_one_second_inside_margin() {
        let now = Utc::now();
        let tokens = tokens_expiring_at(now + AuthTokens::safety_margin() - Duration::seconds(1));
        assert!(!tokens.is_valid_at(now));
    }

    #[test]
    fn test_invalid_exactly_at_margin() {
        let now = Utc::now();
        let tokens = tokens_expiring_at(now + AuthTokens::safety_margin());
        assert!(!tokens.is_valid_at(now));
    }

    #[test]
    fn test_invalid_with_empty_access_token() {
        let now = Utc::now();
        let mut tokens = tokens_expiring_at(now + Duration::hours(1));
        tokens.access_token.clear();
        assert!(!tokens.is_valid_at(now));
    }

    #[test]
    fn test_expiry_survives_serialization() {
        let tokens = AuthTokens::issue("a", "r", None, 3600, Utc::now()).unwrap();
        let json = serde_json::to_string(&tokens).unwrap();
        let restored: AuthTokens = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.expires_at, tokens.expires_at);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens =
            AuthTokens::issue("secret-access", "secret-refresh", None, 60, Utc::now()).unwrap();
        let debug = format!("{tokens:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}

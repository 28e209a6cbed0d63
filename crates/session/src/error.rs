//! Session error type with Sentry integration.
//!
//! Every fallible [`crate::SessionClient`] operation returns
//! `Result<T, SessionError>`. Failures the platform is responsible for are
//! reported to Sentry where they happen; this module only provides the
//! scope helpers.

use storefront_session_core::EmailError;
use thiserror::Error;

use crate::api::FieldError;
use crate::refresh::RefreshError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors surfaced by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network failure or a non-401 HTTP failure. No state was changed.
    #[error("Platform request failed: {0}")]
    Transport(TransportError),

    /// A 401 that could not be recovered by refreshing. Carries the original
    /// response, not the one from the retry.
    #[error("Unauthorized: {0}")]
    Unauthorized(TransportError),

    /// An explicit refresh failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// The platform answered but reported `success: false`.
    #[error("{message}")]
    Api {
        /// Platform message.
        message: String,
        /// Per-field validation failures.
        field_errors: Vec<FieldError>,
    },

    /// The response body was missing required fields or wasn't JSON.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Rejected locally before any request was made.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Rejected locally before any request was made.
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// The operation needs a session and there is none.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session store couldn't be opened.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        if err.is_unauthorized() {
            Self::Unauthorized(err)
        } else {
            Self::Transport(err)
        }
    }
}

impl SessionError {
    /// Whether this error means the caller has to sign in again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_)
                | Self::NotAuthenticated
                | Self::Refresh(RefreshError::MissingRefreshToken | RefreshError::Rejected(_))
        )
    }

    /// HTTP status behind this error, if there was a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) | Self::Unauthorized(err) => err.status(),
            _ => None,
        }
    }
}

/// Result type alias for `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Set the Sentry user context for the signed-in customer.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Record a session lifecycle step as a Sentry breadcrumb.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data.unwrap_or_default() {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_401_becomes_unauthorized() {
        let err: SessionError = TransportError::from_status(401, None).into();
        assert!(matches!(err, SessionError::Unauthorized(_)));
        assert!(err.requires_login());
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_other_transport_errors_stay_transport() {
        let err: SessionError = TransportError::from_status(500, None).into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(!err.requires_login());

        let err: SessionError = TransportError::Timeout.into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_error_display() {
        let err = SessionError::Api {
            message: "Email already registered".to_string(),
            field_errors: Vec::new(),
        };
        assert_eq!(err.to_string(), "Email already registered");

        let err = SessionError::WeakPassword("too short".to_string());
        assert_eq!(err.to_string(), "Weak password: too short");
    }

    #[test]
    fn test_refresh_rejection_requires_login() {
        let err = SessionError::Refresh(RefreshError::Rejected("expired".to_string()));
        assert!(err.requires_login());

        let err = SessionError::Refresh(RefreshError::Transient(TransportError::Timeout));
        assert!(!err.requires_login());
    }

    #[test]
    fn test_sentry_helpers_without_client() {
        set_sentry_user(&"cust-1", Some("a@b.test"));
        add_breadcrumb("auth", "Signed in", Some(&[("customer_id", "cust-1")]));
        clear_sentry_user();
    }
}

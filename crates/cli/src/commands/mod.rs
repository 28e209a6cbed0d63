//! Subcommand implementations.

pub mod account;
pub mod session;

use storefront_session::{ConfigError, SessionError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Reading from the terminal failed.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The command needs a stored session.
    #[error("Not signed in. Run `storefront-session login` first")]
    NotSignedIn,

    /// The platform refused to extend the session.
    #[error("Session could not be extended")]
    ExtendFailed,
}

impl CommandError {
    /// Map "no session" style failures onto [`CommandError::NotSignedIn`].
    pub fn from_session(err: SessionError) -> Self {
        if err.requires_login() {
            Self::NotSignedIn
        } else {
            Self::Session(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_session::TransportError;

    #[test]
    fn test_requires_login_maps_to_not_signed_in() {
        let err = CommandError::from_session(SessionError::NotAuthenticated);
        assert!(matches!(err, CommandError::NotSignedIn));

        let err = CommandError::from_session(SessionError::Unauthorized(
            TransportError::from_status(401, None),
        ));
        assert!(matches!(err, CommandError::NotSignedIn));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = CommandError::from_session(SessionError::Transport(TransportError::Timeout));
        assert_eq!(err.to_string(), "Platform request failed: request timed out");
    }
}

//! Session inspection and upkeep commands.

use std::time::Duration;

use chrono::{DateTime, Utc};
use storefront_session::{AuthTokens, SessionClient, SessionKeeper, SessionState};

use super::CommandError;

/// Print the stored session without touching the network.
#[allow(clippy::print_stdout)]
pub fn status(client: &SessionClient) {
    let state = client.state();
    println!("State:   {}", state_label(state));

    if let Some(tokens) = client.tokens() {
        println!("Expires: {}", describe_expiry(&tokens, Utc::now()));
    }
    if let Some(profile) = client.cached_profile() {
        println!("Customer: {}", profile.id);
    }
}

/// Force a refresh now.
pub async fn extend(client: &SessionClient) -> Result<(), CommandError> {
    if !client.has_session() {
        return Err(CommandError::NotSignedIn);
    }
    if !client.extend_session().await {
        return Err(CommandError::ExtendFailed);
    }
    if let Some(tokens) = client.tokens() {
        tracing::info!(expires_at = %tokens.expires_at, "Session extended");
    }
    Ok(())
}

/// Refresh on a fixed interval until Ctrl-C.
pub async fn keep_alive(client: &SessionClient, interval: Duration) -> Result<(), CommandError> {
    if !client.has_session() {
        return Err(CommandError::NotSignedIn);
    }

    let keeper = SessionKeeper::spawn(client.clone(), interval);
    tracing::info!("Keeping session alive, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    keeper.shutdown().await;

    if !client.has_session() {
        tracing::warn!("Session ended while keeping alive");
    }
    Ok(())
}

const fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Uninitialized => "not loaded",
        SessionState::Authenticated => "signed in",
        SessionState::Unauthenticated => "signed out",
    }
}

fn describe_expiry(tokens: &AuthTokens, now: DateTime<Utc>) -> String {
    let remaining = tokens.expires_at - now;
    if remaining.num_seconds() <= 0 {
        format!("{} (expired)", tokens.expires_at.to_rfc3339())
    } else if !tokens.is_valid_at(now) {
        format!("{} (needs refresh)", tokens.expires_at.to_rfc3339())
    } else {
        format!(
            "{} (in {}m)",
            tokens.expires_at.to_rfc3339(),
            remaining.num_minutes()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_expiry() {
        let now = Utc::now();
        let fresh = AuthTokens::issue("a", "r", None, 3600, now).unwrap();
        assert!(describe_expiry(&fresh, now).ends_with("(in 60m)"));

        let closing = AuthTokens::issue("a", "r", None, 120, now).unwrap();
        assert!(describe_expiry(&closing, now).ends_with("(needs refresh)"));

        let expired =
            AuthTokens::issue("a", "r", None, 60, now - chrono::Duration::hours(1)).unwrap();
        assert!(describe_expiry(&expired, now).ends_with("(expired)"));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(state_label(SessionState::Authenticated), "signed in");
        assert_eq!(state_label(SessionState::Unauthenticated), "signed out");
    }
}

//! Sign-in, restart and sign-out against the mock platform and a session file.

#![allow(clippy::unwrap_used)]

use storefront_session::{
    FileSessionStore, ProfileUpdate, Registration, SessionError, SessionState, SessionStore,
    StoreKeys,
};
use storefront_session_integration_tests::{API_KEY, MockPlatform, TOKEN_LIFETIME_SECS};

fn registration(email: &str) -> Registration {
    Registration {
        email: email.to_string(),
        password: "correct-horse-battery".to_string(),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        accepts_marketing: true,
        ..Registration::default()
    }
}

#[tokio::test]
async fn test_register_then_restart_restores_session() {
    let platform = MockPlatform::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let client = platform.client(&path);
    assert_eq!(client.state(), SessionState::Unauthenticated);

    let before = chrono::Utc::now();
    let user = client.register(registration("ada@shop.test")).await.unwrap().unwrap();
    assert_eq!(user.full_name(), "Ada Lovelace");
    assert!(user.preferences.accepts_marketing);

    let tokens = client.tokens().unwrap();
    assert!(tokens.expires_at >= before + chrono::Duration::seconds(TOKEN_LIFETIME_SECS));
    assert_eq!(platform.last_header("x-api-key").as_deref(), Some(API_KEY));
    drop(client);

    let restarted = platform.client(&path);
    assert_eq!(restarted.state(), SessionState::Authenticated);
    assert_eq!(restarted.cached_profile().unwrap().id, user.id);

    let profile = restarted.profile().await.unwrap();
    assert_eq!(profile.email.as_deref(), Some("ada@shop.test"));
    assert_eq!(platform.hits("POST /auth/refresh"), 0);
}

#[tokio::test]
async fn test_logout_clears_file_and_revokes() {
    let platform = MockPlatform::start().await;
    platform.seed_account("grace@shop.test", "hopper-1906", "Grace");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let client = platform.client(&path);
    client.login("grace@shop.test", "hopper-1906").await.unwrap();
    assert!(client.is_authenticated());

    client.logout().await.unwrap();
    assert_eq!(client.state(), SessionState::Unauthenticated);
    assert_eq!(platform.hits("POST /auth/logout"), 1);

    let store = FileSessionStore::open(&path).unwrap();
    assert_eq!(store.get(StoreKeys::TOKENS).unwrap(), None);
    assert_eq!(store.get(StoreKeys::PROFILE).unwrap(), None);

    let restarted = platform.client(&path);
    assert_eq!(restarted.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_failure_still_clears_locally() {
    let platform = MockPlatform::start().await;
    platform.seed_account("grace@shop.test", "hopper-1906", "Grace");
    platform.fail_logout_with(Some(503));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let client = platform.client(&path);
    client.login("grace@shop.test", "hopper-1906").await.unwrap();

    let result = client.logout().await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert!(!client.has_session());
    assert_eq!(platform.client(&path).state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized_and_keeps_nothing() {
    let platform = MockPlatform::start().await;
    platform.seed_account("grace@shop.test", "hopper-1906", "Grace");
    let dir = tempfile::tempdir().unwrap();

    let client = platform.client(&dir.path().join("session.json"));
    let result = client.login("grace@shop.test", "not-the-password").await;

    assert!(matches!(result, Err(SessionError::Unauthorized(_))));
    assert!(!client.has_session());
    assert_eq!(platform.hits("POST /auth/refresh"), 0);
}

#[tokio::test]
async fn test_duplicate_registration_reports_field_errors() {
    let platform = MockPlatform::start().await;
    let dir = tempfile::tempdir().unwrap();
    let client = platform.client(&dir.path().join("session.json"));

    client.register(registration("ada@shop.test")).await.unwrap();
    let result = client.register(registration("ada@shop.test")).await;

    match result {
        Err(SessionError::Api { field_errors, .. }) => {
            assert_eq!(field_errors.first().unwrap().field.as_deref(), Some("email"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    // First registration's session survives the failed second attempt
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_update_profile_and_delete_account() {
    let platform = MockPlatform::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let client = platform.client(&path);
    client.register(registration("ada@shop.test")).await.unwrap();

    let updated = client
        .update_profile(&ProfileUpdate {
            phone: Some("+15550100".to_string()),
            locale: Some("en-GB".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.phone.as_deref(), Some("+15550100"));
    assert_eq!(updated.preferences.locale.as_deref(), Some("en-GB"));
    assert_eq!(
        platform.client(&path).cached_profile().unwrap().phone.as_deref(),
        Some("+15550100")
    );

    client.delete_account().await.unwrap();
    assert!(!platform.has_account("ada@shop.test"));
    assert!(!client.has_session());
    assert_eq!(platform.client(&path).state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_check_session_detects_server_side_revocation() {
    let platform = MockPlatform::start().await;
    platform.seed_account("grace@shop.test", "hopper-1906", "Grace");
    let dir = tempfile::tempdir().unwrap();
    let client = platform.client(&dir.path().join("session.json"));
    client.login("grace@shop.test", "hopper-1906").await.unwrap();

    assert!(client.check_session().await);

    platform.expire_access_tokens();
    platform.revoke_refresh_tokens();

    assert!(!client.check_session().await);
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_key_prefix_isolates_sessions() {
    let platform = MockPlatform::start().await;
    platform.seed_account("grace@shop.test", "hopper-1906", "Grace");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let mut config = platform.session_config(&path);
    config.key_prefix = "eu".to_string();
    let eu = storefront_session::SessionClient::from_config(&config).unwrap();
    eu.load();
    eu.login("grace@shop.test", "hopper-1906").await.unwrap();

    let default = platform.client(&path);
    assert_eq!(default.state(), SessionState::Unauthenticated);

    let store = FileSessionStore::open(&path).unwrap();
    assert!(store.get("eu:auth_tokens").unwrap().is_some());
}

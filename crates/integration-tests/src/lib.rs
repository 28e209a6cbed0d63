//! Integration tests for the storefront session client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storefront-session-integration-tests
//! ```
//!
//! No external services are needed. Each test starts a [`MockPlatform`], an
//! in-process `axum` server that speaks the platform's REST envelope and
//! issues real (random-free, counter based) tokens, and points a
//! [`SessionClient`] at it over HTTP.
//!
//! # Test Categories
//!
//! - `session_lifecycle` - sign-in, restart, sign-out against a file store
//! - `token_refresh` - expiry recovery and single-flight refresh
//! - `transport` - `reqwest` transport headers and error mapping

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{Value, json};
use storefront_session::{PlatformConfig, SessionClient, SessionConfig};
use tokio::task::JoinHandle;
use url::Url;

/// Lifetime of every access token the mock issues.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// API key the mock expects when one is configured.
pub const API_KEY: &str = "pk_test_Q7fz2LmW9xRb4TnK8cVd";

#[derive(Debug, Clone)]
struct Account {
    password: String,
    profile: Value,
}

#[derive(Debug, Default)]
struct PlatformState {
    next_token: u64,
    next_customer: u64,
    accounts: HashMap<String, Account>,
    /// access token -> email
    access: HashMap<String, String>,
    /// refresh token -> email
    refresh: HashMap<String, String>,
    hits: HashMap<String, usize>,
    last_headers: HashMap<String, String>,
    refresh_delay: Duration,
    refresh_failure: Option<StatusCode>,
    logout_failure: Option<StatusCode>,
    omit_rotated_refresh: bool,
}

impl PlatformState {
    fn record(&mut self, route: &str, headers: &HeaderMap) {
        *self.hits.entry(route.to_owned()).or_default() += 1;
        self.last_headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
    }

    fn issue(&mut self, email: &str) -> (String, String) {
        self.next_token += 1;
        let access = format!("access-{}", self.next_token);
        let refresh = format!("refresh-{}", self.next_token);
        self.access.insert(access.clone(), email.to_owned());
        self.refresh.insert(refresh.clone(), email.to_owned());
        (access, refresh)
    }

    fn grant(&mut self, email: &str) -> Value {
        let (access, refresh) = self.issue(email);
        let user = self.accounts.get(email).map(|a| a.profile.clone());
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
            "expires_in": TOKEN_LIFETIME_SECS,
            "user": user,
        })
    }

    fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.access.get(token).cloned()
    }

    fn revoke(&mut self, email: &str) {
        self.access.retain(|_, owner| owner != email);
        self.refresh.retain(|_, owner| owner != email);
    }
}

type Shared = Arc<Mutex<PlatformState>>;

fn lock(state: &Shared) -> MutexGuard<'_, PlatformState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn success(data: Value) -> Response {
    Json(json!({"success": true, "data": data})).into_response()
}

fn acknowledged() -> Response {
    Json(json!({"success": true})).into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "message": message}))).into_response()
}

fn unauthorized() -> Response {
    failure(StatusCode::UNAUTHORIZED, "Unauthenticated")
}

fn str_field<'a>(body: &'a Value, field: &str) -> &'a str {
    body.get(field).and_then(Value::as_str).unwrap_or_default()
}

// =============================================================================
// Handlers
// =============================================================================

async fn register(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = lock(&state);
    state.record("POST /auth/register", &headers);

    let email = str_field(&body, "email").to_owned();
    if state.accounts.contains_key(&email) {
        return Json(json!({
            "success": false,
            "message": "Validation failed",
            "errors": [{"field": "email", "message": "has already been taken"}],
        }))
        .into_response();
    }

    state.next_customer += 1;
    let profile = json!({
        "id": format!("cust-{}", state.next_customer),
        "email": email,
        "first_name": body.get("first_name"),
        "last_name": body.get("last_name"),
        "email_verified": false,
        "two_factor_enabled": false,
        "preferences": {"accepts_marketing": body.get("accepts_marketing").and_then(Value::as_bool).unwrap_or(false)},
        "addresses": [],
    });
    state.accounts.insert(
        email.clone(),
        Account {
            password: str_field(&body, "password").to_owned(),
            profile,
        },
    );

    let grant = state.grant(&email);
    success(grant)
}

async fn login(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = lock(&state);
    state.record("POST /auth/login", &headers);

    let email = str_field(&body, "email");
    let valid = state
        .accounts
        .get(email)
        .is_some_and(|a| a.password == str_field(&body, "password"));
    if !valid {
        return failure(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let grant = state.grant(email);
    success(grant)
}

async fn refresh(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let delay = {
        let mut state = lock(&shared);
        state.record("POST /auth/refresh", &headers);
        state.refresh_delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut state = lock(&shared);
    if let Some(status) = state.refresh_failure {
        return failure(status, "Refresh unavailable");
    }

    let presented = str_field(&body, "refresh_token");
    let Some(email) = state.refresh.remove(presented) else {
        return failure(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    };

    let mut grant = state.grant(&email);
    if state.omit_rotated_refresh {
        // Non-rotating platform: the presented token stays valid
        if let Some(issued) = grant.get("refresh_token").and_then(Value::as_str) {
            let issued = issued.to_owned();
            state.refresh.remove(&issued);
        }
        state.refresh.insert(presented.to_owned(), email);
        if let Some(obj) = grant.as_object_mut() {
            obj.remove("refresh_token");
        }
    }
    success(grant)
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    state.record("POST /auth/logout", &headers);
    if let Some(status) = state.logout_failure {
        return failure(status, "Logout failed");
    }
    let Some(email) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state.revoke(&email);
    acknowledged()
}

async fn get_profile(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    state.record("GET /customer/profile", &headers);
    let Some(email) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state
        .accounts
        .get(&email)
        .map_or_else(unauthorized, |a| success(a.profile.clone()))
}

async fn update_profile(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = lock(&state);
    state.record("PUT /customer/profile", &headers);
    let Some(email) = state.authenticate(&headers) else {
        return unauthorized();
    };
    let Some(account) = state.accounts.get_mut(&email) else {
        return unauthorized();
    };

    if let (Some(profile), Some(changes)) = (account.profile.as_object_mut(), body.as_object()) {
        for (key, value) in changes {
            match key.as_str() {
                "accepts_marketing" | "locale" | "currency" => {
                    if let Some(prefs) = profile
                        .get_mut("preferences")
                        .and_then(Value::as_object_mut)
                    {
                        prefs.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    profile.insert(key.clone(), value.clone());
                }
            }
        }
    }
    success(account.profile.clone())
}

async fn delete_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    state.record("DELETE /customer/account", &headers);
    let Some(email) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state.accounts.remove(&email);
    state.revoke(&email);
    acknowledged()
}

async fn echo(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = lock(&state);
    state.record("GET /debug/echo", &headers);
    success(json!({"query": query}))
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    acknowledged()
}

async fn plain_text() -> Response {
    (StatusCode::OK, "definitely not json").into_response()
}

async fn teapot() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/customer/profile", get(get_profile).put(update_profile))
        .route("/api/v1/customer/account", delete(delete_account))
        .route("/api/v1/debug/echo", get(echo))
        .route("/api/v1/debug/slow", get(slow))
        .route("/api/v1/debug/text", get(plain_text))
        .route("/api/v1/debug/teapot", get(teapot))
        .with_state(state)
}

// =============================================================================
// MockPlatform
// =============================================================================

/// An in-process platform API served over real HTTP on `127.0.0.1`.
///
/// Routes live under `/api/v1` so tests also cover base URLs with a path.
pub struct MockPlatform {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockPlatform {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    #[allow(clippy::unwrap_used)]
    pub async fn start() -> Self {
        let state = Shared::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&state));

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Mock platform stopped");
            }
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the mock API.
    ///
    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/v1", self.addr)).unwrap()
    }

    /// Transport settings pointing at this platform, with the test API key.
    #[must_use]
    pub fn platform_config(&self, timeout_secs: u64) -> PlatformConfig {
        PlatformConfig {
            api_url: self.base_url(),
            api_key: Some(SecretString::from(API_KEY)),
            timeout_secs,
        }
    }

    /// Full client configuration with the session file at `store_path`.
    #[must_use]
    pub fn session_config(&self, store_path: &Path) -> SessionConfig {
        SessionConfig {
            platform: self.platform_config(5),
            store_path: store_path.to_path_buf(),
            key_prefix: String::new(),
            extend_interval_secs: 600,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// A client backed by a file store at `store_path`, with the stored
    /// session (if any) already loaded.
    ///
    /// # Panics
    ///
    /// Panics if the client can't be built.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn client(&self, store_path: &Path) -> SessionClient {
        let client = SessionClient::from_config(&self.session_config(store_path)).unwrap();
        client.load();
        client
    }

    /// Create an account directly, without signing anything in.
    pub fn seed_account(&self, email: &str, password: &str, first_name: &str) {
        let mut state = lock(&self.state);
        state.next_customer += 1;
        let profile = json!({
            "id": format!("cust-{}", state.next_customer),
            "email": email,
            "first_name": first_name,
        });
        state.accounts.insert(
            email.to_owned(),
            Account {
                password: password.to_owned(),
                profile,
            },
        );
    }

    /// Number of requests received for `route`, e.g. `"POST /auth/refresh"`.
    #[must_use]
    pub fn hits(&self, route: &str) -> usize {
        lock(&self.state).hits.get(route).copied().unwrap_or_default()
    }

    /// A header from the most recent request.
    #[must_use]
    pub fn last_header(&self, name: &str) -> Option<String> {
        lock(&self.state).last_headers.get(name).cloned()
    }

    /// Invalidate every outstanding access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        lock(&self.state).access.clear();
    }

    /// Invalidate every outstanding refresh token.
    pub fn revoke_refresh_tokens(&self) {
        lock(&self.state).refresh.clear();
    }

    /// Hold each refresh request for `delay` before answering.
    pub fn set_refresh_delay(&self, delay: Duration) {
        lock(&self.state).refresh_delay = delay;
    }

    /// Answer every refresh with `status`, or restore normal behavior.
    pub fn fail_refresh_with(&self, status: Option<u16>) {
        lock(&self.state).refresh_failure =
            status.and_then(|s| StatusCode::from_u16(s).ok());
    }

    /// Answer every logout with `status`, or restore normal behavior.
    pub fn fail_logout_with(&self, status: Option<u16>) {
        lock(&self.state).logout_failure = status.and_then(|s| StatusCode::from_u16(s).ok());
    }

    /// Stop rotating refresh tokens; refresh responses omit `refresh_token`.
    pub fn disable_refresh_rotation(&self) {
        lock(&self.state).omit_rotated_refresh = true;
    }

    /// Whether `email` still has an account.
    #[must_use]
    pub fn has_account(&self, email: &str) -> bool {
        lock(&self.state).accounts.contains_key(email)
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.server.abort();
    }
}

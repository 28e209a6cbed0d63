//! Customer session facade.
//!
//! [`SessionClient`] is the one type applications talk to. It owns the token
//! store, the refresh coordinator and the request executor, and exposes the
//! sign-in, account and profile operations of the platform API on top of
//! them.

use std::sync::Arc;

use chrono::Utc;
use storefront_session_core::{AuthTokens, Email, UserProfile};

use crate::api::{
    self, ChangePasswordRequest, CodeRequest, EmailRequest, LoginRequest, MIN_PASSWORD_LENGTH,
    ProfileUpdate, Registration, ResetPasswordRequest, SocialLoginRequest, SocialProvider,
    TokenGrant, TokenRequest, TwoFactorSetup, paths,
};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::executor::RequestExecutor;
use crate::refresh::RefreshCoordinator;
use crate::store::{FileSessionStore, SessionStore, StoreKeys};
use crate::tokens::{SessionState, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

/// Authenticated access to the platform API for one customer.
///
/// Cheap to clone; clones share all session state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<SessionClientInner>,
}

struct SessionClientInner {
    tokens: Arc<TokenStore>,
    refresher: RefreshCoordinator,
    executor: RequestExecutor,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client using the default store keys.
    ///
    /// The client starts [`SessionState::Uninitialized`]; call
    /// [`SessionClient::load`] to restore a stored session.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_keys(transport, store, StoreKeys::default())
    }

    /// Create a client whose session lives under `keys`.
    #[must_use]
    pub fn with_keys(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
        keys: StoreKeys,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(store, keys));
        let refresher = RefreshCoordinator::new(Arc::clone(&tokens), Arc::clone(&transport));
        let executor = RequestExecutor::new(Arc::clone(&tokens), refresher.clone(), transport);

        Self {
            inner: Arc::new(SessionClientInner {
                tokens,
                refresher,
                executor,
            }),
        }
    }

    /// Wire up a client from configuration: `reqwest` transport and a
    /// file-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client can't be built or the session file
    /// can't be opened.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.platform)?;
        let store = FileSessionStore::open(&config.store_path)?;
        Ok(Self::with_keys(
            Arc::new(transport),
            Arc::new(store),
            StoreKeys::with_prefix(&config.key_prefix),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    /// Restore the stored session, if it is still valid.
    pub fn load(&self) -> SessionState {
        let state = self.inner.tokens.load();
        if let Some(profile) = self.inner.tokens.profile() {
            set_sentry_user(&profile.id, profile.email.as_deref());
        }
        state
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.tokens.state()
    }

    /// Whether usable tokens are held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    /// Whether any tokens are held, even ones that need a refresh.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.inner.tokens.has_tokens()
    }

    /// Snapshot of the current tokens.
    #[must_use]
    pub fn tokens(&self) -> Option<AuthTokens> {
        self.inner.tokens.current()
    }

    /// The profile cached at sign-in or by the last profile fetch.
    #[must_use]
    pub fn cached_profile(&self) -> Option<UserProfile> {
        self.inner.tokens.profile()
    }

    /// The refresh coordinator shared by every request of this client.
    #[must_use]
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.inner.refresher
    }

    /// Send an arbitrary request through the credentialed executor.
    ///
    /// # Errors
    ///
    /// See [`RequestExecutor::execute`].
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.executor.execute(request).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sign-in / sign-out
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign in with email and password.
    ///
    /// Returns the customer if the platform included one. On any failure the
    /// previous session (if any) is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmail`/`WeakPassword` without a request when the input
    /// is unusable, `Api` when the platform refuses the credentials and
    /// `MalformedResponse` when the token payload is incomplete.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<UserProfile>> {
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(SessionError::WeakPassword("password is required".to_string()));
        }

        let request = ApiRequest::post(paths::LOGIN).public().json(&LoginRequest {
            email: email.as_str(),
            password,
        });
        let response = self.execute(request).await?;
        self.establish(response, "password")
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::login`], plus `WeakPassword` when the password
    /// is shorter than [`MIN_PASSWORD_LENGTH`].
    pub async fn register(&self, registration: Registration) -> Result<Option<UserProfile>> {
        let email = Email::parse(&registration.email)?;
        validate_password(&registration.password)?;

        let registration = Registration {
            email: email.into_inner(),
            ..registration
        };
        let request = ApiRequest::post(paths::REGISTER)
            .public()
            .json(&registration);
        let response = self.execute(request).await?;
        self.establish(response, "register")
    }

    /// Sign in with a token from an identity provider.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::login`].
    pub async fn social_login(
        &self,
        provider: SocialProvider,
        token: &str,
    ) -> Result<Option<UserProfile>> {
        let request = ApiRequest::post(paths::social(provider))
            .public()
            .json(&SocialLoginRequest { token });
        let response = self.execute(request).await?;
        self.establish(response, provider.as_str())
    }

    fn establish(&self, response: ApiResponse, method: &str) -> Result<Option<UserProfile>> {
        let grant: TokenGrant = api::payload(response)?;
        let (tokens, user) = grant.into_tokens(Utc::now(), None)?;
        self.inner.tokens.save_session(tokens, user.clone());

        if let Some(user) = &user {
            set_sentry_user(&user.id, user.email.as_deref());
        }
        tracing::info!(
            method,
            customer_id = user.as_ref().map(|u| u.id.as_str()),
            "Customer signed in"
        );
        add_breadcrumb("auth", "Signed in", Some(&[("method", method)]));
        Ok(user)
    }

    /// Sign out.
    ///
    /// The local session is cleared before the platform is contacted, so it
    /// is gone even if this future is dropped mid-request. The platform call
    /// carries the tokens being signed out. A 401 here is never recovered.
    ///
    /// # Errors
    ///
    /// Returns the platform failure, after the local session is gone.
    pub async fn logout(&self) -> Result<()> {
        let signed_out = self.inner.tokens.current();
        self.end_session("logout");

        let Some(tokens) = signed_out else {
            return Ok(());
        };
        let request = ApiRequest::post(paths::LOGOUT).without_recovery();
        let remote = match self.inner.executor.send_as(request, &tokens).await {
            Ok(response) => api::acknowledge(response),
            Err(e) => Err(e),
        };

        if let Err(e) = &remote {
            tracing::warn!(error = %e, "Platform logout failed, local session cleared");
        }
        remote
    }

    fn end_session(&self, reason: &str) {
        self.inner.tokens.clear();
        clear_sentry_user();
        tracing::info!(reason, "Session ended");
        add_breadcrumb("auth", "Session ended", Some(&[("reason", reason)]));
    }

    fn require_session(&self) -> Result<()> {
        if self.has_session() {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Password & email
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the platform to email a password reset link.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmail` without a request, or the platform failure.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = Email::parse(email)?;
        let request = ApiRequest::post(paths::PASSWORD_FORGOT)
            .public()
            .json(&EmailRequest {
                email: email.as_str(),
            });
        api::acknowledge(self.execute(request).await?)
    }

    /// Set a new password using the token from a reset email.
    ///
    /// # Errors
    ///
    /// Returns `WeakPassword` without a request, or the platform failure.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let request = ApiRequest::post(paths::PASSWORD_RESET)
            .public()
            .json(&ResetPasswordRequest {
                token,
                password: new_password,
            });
        api::acknowledge(self.execute(request).await?)
    }

    /// Change the signed-in customer's password.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` or `WeakPassword` without a request, or the
    /// platform failure.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        self.require_session()?;
        validate_password(new_password)?;
        let request = ApiRequest::post(paths::PASSWORD_CHANGE).json(&ChangePasswordRequest {
            current_password,
            new_password,
        });
        api::acknowledge(self.execute(request).await?)
    }

    /// Confirm an email address with the token from a verification email.
    ///
    /// # Errors
    ///
    /// Returns the platform failure.
    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let request = ApiRequest::post(paths::EMAIL_VERIFY)
            .public()
            .json(&TokenRequest { token });
        api::acknowledge(self.execute(request).await?)?;
        self.inner.tokens.update_profile(|p| p.email_verified = true);
        Ok(())
    }

    /// Send another verification email to the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn resend_verification_email(&self) -> Result<()> {
        self.require_session()?;
        api::acknowledge(self.execute(ApiRequest::post(paths::EMAIL_RESEND)).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Two-factor authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Start enabling two-factor authentication.
    ///
    /// Two-factor isn't active until the returned secret is confirmed with
    /// [`SessionClient::verify_two_factor`].
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn enable_two_factor(&self) -> Result<TwoFactorSetup> {
        self.require_session()?;
        api::payload(self.execute(ApiRequest::post(paths::TWO_FACTOR_ENABLE)).await?)
    }

    /// Confirm two-factor setup with a code from the authenticator.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn verify_two_factor(&self, code: &str) -> Result<()> {
        self.require_session()?;
        let request = ApiRequest::post(paths::TWO_FACTOR_VERIFY).json(&CodeRequest { code });
        api::acknowledge(self.execute(request).await?)?;
        self.inner.tokens.update_profile(|p| p.two_factor_enabled = true);
        Ok(())
    }

    /// Turn two-factor authentication off.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn disable_two_factor(&self, code: &str) -> Result<()> {
        self.require_session()?;
        let request = ApiRequest::post(paths::TWO_FACTOR_DISABLE).json(&CodeRequest { code });
        api::acknowledge(self.execute(request).await?)?;
        self.inner.tokens.update_profile(|p| p.two_factor_enabled = false);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profile & account
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the customer's profile and refresh the cached copy.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn profile(&self) -> Result<UserProfile> {
        self.require_session()?;
        let profile: UserProfile =
            api::payload(self.execute(ApiRequest::get(paths::PROFILE)).await?)?;
        self.inner.tokens.save_profile(profile.clone());
        Ok(profile)
    }

    /// Update profile fields and cache the platform's view of the result.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        self.require_session()?;
        let request = ApiRequest::put(paths::PROFILE).json(update);
        let profile: UserProfile = api::payload(self.execute(request).await?)?;
        self.inner.tokens.save_profile(profile.clone());
        Ok(profile)
    }

    /// Permanently delete the account and end the session.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a request, or the platform failure
    /// (in which case the session is kept).
    pub async fn delete_account(&self) -> Result<()> {
        self.require_session()?;
        api::acknowledge(self.execute(ApiRequest::delete(paths::ACCOUNT)).await?)?;
        self.end_session("account deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session upkeep
    // ─────────────────────────────────────────────────────────────────────────

    /// Confirm with the platform that the session is still good.
    ///
    /// Returns `false` straight away when not authenticated. Any failure of
    /// the profile fetch ends the session.
    pub async fn check_session(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }

        match self.profile().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                self.end_session("session check failed");
                false
            }
        }
    }

    /// Force a token refresh regardless of expiry.
    ///
    /// Joins a refresh that is already running. Never fails; returns whether
    /// new tokens were obtained.
    pub async fn extend_session(&self) -> bool {
        match self.inner.refresher.refresh().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Session extension failed");
                false
            }
        }
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(SessionError::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

//! Platform REST API wire types.
//!
//! Every platform response is wrapped in an [`Envelope`]. Auth endpoints carry
//! a [`TokenGrant`] in `data`; everything else carries a profile, a 2FA setup
//! payload or nothing at all.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storefront_session_core::{AuthTokens, UserProfile};

use crate::error::SessionError;
use crate::transport::ApiResponse;

/// Minimum password length enforced before anything reaches the network.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Endpoint paths, relative to the configured API base.
pub mod paths {
    pub const LOGIN: &str = "/auth/login";
    pub const REGISTER: &str = "/auth/register";
    pub const LOGOUT: &str = "/auth/logout";
    pub const REFRESH: &str = "/auth/refresh";
    pub const PASSWORD_FORGOT: &str = "/auth/password/forgot";
    pub const PASSWORD_RESET: &str = "/auth/password/reset";
    pub const PASSWORD_CHANGE: &str = "/auth/password/change";
    pub const EMAIL_VERIFY: &str = "/auth/email/verify";
    pub const EMAIL_RESEND: &str = "/auth/email/resend";
    pub const TWO_FACTOR_ENABLE: &str = "/auth/2fa/enable";
    pub const TWO_FACTOR_VERIFY: &str = "/auth/2fa/verify";
    pub const TWO_FACTOR_DISABLE: &str = "/auth/2fa/disable";
    pub const PROFILE: &str = "/customer/profile";
    pub const ACCOUNT: &str = "/customer/account";

    /// `/auth/social/{provider}`
    #[must_use]
    pub fn social(provider: super::SocialProvider) -> String {
        format!("/auth/social/{}", provider.as_str())
    }
}

// =============================================================================
// Response Envelope
// =============================================================================

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending input field, if the platform named one.
    #[serde(default)]
    pub field: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// `{ success, data?, message?, errors? }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Absent means success; some endpoints omit it.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Payload.
    pub data: Option<T>,
    /// Summary message.
    #[serde(default)]
    pub message: Option<String>,
    /// Field-level validation failures.
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

const fn default_success() -> bool {
    true
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse an envelope from a successful transport response.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the body isn't an envelope.
    pub fn from_response(response: ApiResponse) -> Result<Self, SessionError> {
        if response.body.is_null() {
            return Ok(Self {
                success: true,
                data: None,
                message: None,
                errors: Vec::new(),
            });
        }
        response
            .json()
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }

    /// Fail with `Api` unless the envelope reports success.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` carrying the platform message and field
    /// errors when `success` is false.
    pub fn into_result(self) -> Result<Option<T>, SessionError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(SessionError::Api {
                message: self
                    .message
                    .or_else(|| self.errors.first().map(|e| e.message.clone()))
                    .unwrap_or_else(|| "request failed".to_string()),
                field_errors: self.errors,
            })
        }
    }

    /// Like [`Envelope::into_result`], but `data` must be present.
    ///
    /// # Errors
    ///
    /// Returns `Api` on an unsuccessful envelope and `MalformedResponse` when
    /// `data` is missing.
    pub fn into_data(self) -> Result<T, SessionError> {
        self.into_result()?
            .ok_or_else(|| SessionError::MalformedResponse("response has no data".to_string()))
    }
}

/// Parse `response` as an envelope and require success, ignoring any payload.
pub(crate) fn acknowledge(response: ApiResponse) -> Result<(), SessionError> {
    Envelope::<serde_json::Value>::from_response(response)?.into_result()?;
    Ok(())
}

/// Parse `response` as an envelope and return its required payload.
pub(crate) fn payload<T: DeserializeOwned>(response: ApiResponse) -> Result<T, SessionError> {
    Envelope::<T>::from_response(response)?.into_data()
}

// =============================================================================
// Token Grant
// =============================================================================

/// Token payload returned by login, register, social login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
    #[serde(alias = "expiresIn")]
    pub expires_in: i64,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl TokenGrant {
    /// Turn the grant into stored tokens, stamping `expires_at` from
    /// `issued_at`.
    ///
    /// A grant without a refresh token falls back to `fallback_refresh`
    /// (platforms that don't rotate refresh tokens).
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the access token is blank, the expiry
    /// isn't positive or is out of range, or no refresh token is available
    /// at all.
    pub fn into_tokens(
        self,
        issued_at: DateTime<Utc>,
        fallback_refresh: Option<&str>,
    ) -> Result<(AuthTokens, Option<UserProfile>), SessionError> {
        if self.access_token.trim().is_empty() {
            return Err(SessionError::MalformedResponse(
                "token response has an empty access token".to_string(),
            ));
        }
        if self.expires_in <= 0 {
            return Err(SessionError::MalformedResponse(format!(
                "token response has a non-positive expiry ({})",
                self.expires_in
            )));
        }

        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| fallback_refresh.map(str::to_owned))
            .ok_or_else(|| {
                SessionError::MalformedResponse("token response has no refresh token".to_string())
            })?;

        let tokens = AuthTokens::issue(
            self.access_token,
            refresh_token,
            self.token_type.as_deref(),
            self.expires_in,
            issued_at,
        )
        .map_err(|e| SessionError::MalformedResponse(format!("token response: {e}")))?;
        Ok((tokens, self.user))
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// New-account details.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub accepts_marketing: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SocialLoginRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmailRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChangePasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CodeRequest<'a> {
    pub code: &'a str,
}

/// Partial profile update. `None` fields are left untouched by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepts_marketing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Returned when two-factor authentication is being enabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwoFactorSetup {
    /// Shared TOTP secret.
    pub secret: String,
    /// `otpauth://` URI for authenticator apps.
    #[serde(default, alias = "otpauthUrl", alias = "qr_code_url")]
    pub otpauth_url: Option<String>,
    /// One-time recovery codes.
    #[serde(default, alias = "backupCodes")]
    pub backup_codes: Vec<String>,
}

/// Identity providers accepted by the social login endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocialProvider {
    Google,
    Facebook,
    Apple,
}

impl SocialProvider {
    /// Path segment for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Apple => "apple",
        }
    }
}

impl std::fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SocialProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "apple" => Ok(Self::Apple),
            other => Err(format!("unknown social provider: {other}")),
        }
    }
}

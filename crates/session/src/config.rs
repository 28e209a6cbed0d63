//! Session client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PLATFORM_API_URL` - Base URL of the platform REST API
//!
//! ## Optional
//! - `PLATFORM_API_KEY` - Storefront API key sent as `X-Api-Key`
//! - `PLATFORM_API_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SESSION_STORE_PATH` - Session file location (default: .storefront-session.json)
//! - `SESSION_KEY_PREFIX` - Namespace for the session store keys (default: none)
//! - `SESSION_EXTEND_INTERVAL_SECS` - Proactive renewal interval (default: 600)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: &str = "30";
const DEFAULT_STORE_PATH: &str = ".storefront-session.json";
const DEFAULT_EXTEND_INTERVAL_SECS: &str = "600";
const MIN_EXTEND_INTERVAL_SECS: u64 = 30;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Full configuration for a session client and its renewal task.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Platform API connection settings
    pub platform: PlatformConfig,
    /// Where the file-backed session store lives
    pub store_path: PathBuf,
    /// Namespace for the session store keys
    pub key_prefix: String,
    /// How often the session keeper forces a refresh
    pub extend_interval_secs: u64,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Platform REST API connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Base URL every request path is resolved against
    pub api_url: Url,
    /// Storefront API key, if the platform requires one
    pub api_key: Option<SecretString>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let platform = PlatformConfig::from_env()?;
        let store_path = PathBuf::from(get_env_or_default("SESSION_STORE_PATH", DEFAULT_STORE_PATH));
        let key_prefix = get_env_or_default("SESSION_KEY_PREFIX", "");
        let extend_interval_secs =
            parse_env::<u64>("SESSION_EXTEND_INTERVAL_SECS", DEFAULT_EXTEND_INTERVAL_SECS)?;
        if extend_interval_secs < MIN_EXTEND_INTERVAL_SECS {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_EXTEND_INTERVAL_SECS".to_string(),
                format!("must be at least {MIN_EXTEND_INTERVAL_SECS} seconds"),
            ));
        }

        Ok(Self {
            platform,
            store_path,
            key_prefix,
            extend_interval_secs,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// The renewal interval as a `Duration`.
    #[must_use]
    pub const fn extend_interval(&self) -> Duration {
        Duration::from_secs(self.extend_interval_secs)
    }
}

impl PlatformConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_required_env("PLATFORM_API_URL")?;
        let api_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("PLATFORM_API_URL".to_string(), e.to_string()))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "PLATFORM_API_URL".to_string(),
                format!("unsupported scheme '{}'", api_url.scheme()),
            ));
        }

        let api_key = get_optional_env("PLATFORM_API_KEY")
            .map(|key| {
                validate_secret_strength(&key, "PLATFORM_API_KEY")?;
                Ok(SecretString::from(key))
            })
            .transpose()?;

        let timeout_secs = parse_env::<u64>("PLATFORM_API_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            api_url,
            api_key,
            timeout_secs,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

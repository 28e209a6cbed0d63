//! Core types for the storefront session client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod profile;
pub mod tokens;

pub use email::{Email, EmailError};
pub use id::*;
pub use profile::{Address, Preferences, UserProfile};
pub use tokens::{AuthTokens, DEFAULT_TOKEN_TYPE, EXPIRY_SAFETY_MARGIN_SECS, TokenError};

//! Customer profile cached alongside the session.

use serde::{Deserialize, Serialize};

use crate::types::id::{AddressId, CustomerId};

/// The signed-in customer as reported by the platform.
///
/// Only `id` is required; every other field defaults when the platform omits
/// it, so a minimal `user` object in an auth response still yields a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform customer ID.
    pub id: CustomerId,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// Given name.
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    /// Contact phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the email address has been confirmed.
    #[serde(default, alias = "emailVerified")]
    pub email_verified: bool,
    /// Whether sign-in requires a second factor.
    #[serde(default, alias = "twoFactorEnabled")]
    pub two_factor_enabled: bool,
    /// Storefront preferences.
    #[serde(default)]
    pub preferences: Preferences,
    /// Saved shipping/billing addresses.
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl UserProfile {
    /// Profile holding nothing but an ID.
    #[must_use]
    pub fn with_id(id: impl Into<CustomerId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            first_name: None,
            last_name: None,
            phone: None,
            email_verified: false,
            two_factor_enabled: false,
            preferences: Preferences::default(),
            addresses: Vec::new(),
        }
    }

    /// The customer's full name, or an empty string when neither part is known.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.to_owned(),
            (None, None) => String::new(),
        }
    }

    /// The address flagged as default, falling back to the first saved one.
    #[must_use]
    pub fn default_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.addresses.first())
    }
}

/// Customer-controlled storefront settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Marketing email opt-in.
    #[serde(default, alias = "acceptsMarketing")]
    pub accepts_marketing: bool,
    /// Preferred locale, e.g. `en-US`.
    #[serde(default)]
    pub locale: Option<String>,
    /// Preferred display currency, e.g. `USD`.
    #[serde(default)]
    pub currency: Option<String>,
}

/// A saved customer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// The address ID.
    pub id: AddressId,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "provinceCode")]
    pub province_code: Option<String>,
    #[serde(default, alias = "countryCode")]
    pub country_code: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether this is the customer's default address.
    #[serde(default, alias = "isDefault")]
    pub is_default: bool,
}

impl Address {
    /// Format the address as a single comma-separated line, skipping blanks.
    #[must_use]
    pub fn formatted_single_line(&self) -> String {
        [
            &self.address1,
            &self.city,
            &self.province_code,
            &self.zip,
            &self.country_code,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

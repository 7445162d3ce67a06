//! Saved addresses and the shipping address snapshot taken at checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nestling_core::{AddressId, UserId};

/// A saved address belonging to a user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Address fields as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    /// Trim every field, upper-case the country and check required fields.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn normalized(self) -> Result<Self, String> {
        fn required(name: &str, value: String, max: usize) -> Result<String, String> {
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(format!("{name} is required"));
            }
            if value.chars().count() > max {
                return Err(format!("{name} must be at most {max} characters"));
            }
            Ok(value)
        }

        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let country = required("country", self.country, 2)?.to_ascii_uppercase();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err("country must be a two-letter ISO code".to_string());
        }

        Ok(Self {
            full_name: required("full_name", self.full_name, 120)?,
            line1: required("line1", self.line1, 200)?,
            line2: optional(self.line2),
            city: required("city", self.city, 100)?,
            region: required("region", self.region, 100)?,
            postal_code: required("postal_code", self.postal_code, 20)?,
            country,
            phone: optional(self.phone),
            is_default: self.is_default,
        })
    }
}

/// Address copied onto a checkout session and its shipping row.
///
/// Stored as JSONB so later edits to a saved address never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Single-line rendering for admin tables and emails.
    #[must_use]
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.full_name.as_str(), self.line1.as_str()];
        if let Some(line2) = &self.line2 {
            parts.push(line2);
        }
        parts.extend([
            self.city.as_str(),
            self.region.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
        ]);
        parts.join(", ")
    }
}

impl From<AddressInput> for ShippingAddress {
    fn from(input: AddressInput) -> Self {
        Self {
            full_name: input.full_name,
            line1: input.line1,
            line2: input.line2,
            city: input.city,
            region: input.region,
            postal_code: input.postal_code,
            country: input.country,
            phone: input.phone,
        }
    }
}

impl From<Address> for ShippingAddress {
    fn from(address: Address) -> Self {
        Self {
            full_name: address.full_name,
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            region: address.region,
            postal_code: address.postal_code,
            country: address.country,
            phone: address.phone,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> AddressInput {
        AddressInput {
            full_name: "  Robin Park ".to_string(),
            line1: "12 Elm St".to_string(),
            line2: Some("   ".to_string()),
            city: "Portland".to_string(),
            region: "OR".to_string(),
            postal_code: "97201".to_string(),
            country: "us".to_string(),
            phone: None,
            is_default: true,
        }
    }

    #[test]
    fn test_normalized_trims_and_uppercases() {
        let address = input().normalized().unwrap();
        assert_eq!(address.full_name, "Robin Park");
        assert_eq!(address.country, "US");
        assert_eq!(address.line2, None);
    }

    #[test]
    fn test_normalized_rejects_missing_fields() {
        let mut bad = input();
        bad.city = " ".to_string();
        assert_eq!(bad.normalized().unwrap_err(), "city is required");

        let mut bad = input();
        bad.country = "USA".to_string();
        assert!(bad.normalized().is_err());
    }

    #[test]
    fn test_one_line() {
        let address = ShippingAddress::from(input().normalized().unwrap());
        assert_eq!(address.one_line(), "Robin Park, 12 Elm St, Portland, OR, 97201, US");
    }
}

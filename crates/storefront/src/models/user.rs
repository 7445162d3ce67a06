//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use nestling_core::{Email, UserId, UserRole};

/// A storefront account (customer or admin).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Customer or admin.
    pub role: UserRole,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

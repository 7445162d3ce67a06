//! Database operations for the storefront `PostgreSQL` database.
//!
//! # Schema: `shop`
//!
//! ## Tables
//!
//! - `users`, `user_passwords`, `addresses` - Customer and admin accounts
//! - `categories`, `products`, `variants`, `suppliers` - Catalog mirrored from the CMS
//! - `inventory` - Stock per variant (`available = quantity - reserved`)
//! - `carts`, `cart_items` - Guest and customer carts
//! - `checkout_sessions`, `checkout_items` - Local mirror of Stripe Checkout Sessions
//! - `orders`, `order_items`, `shipping`, `payments` - Reconciled orders
//! - `registries`, `registry_items` - Gift registries
//! - `dropship_orders`, `dropship_order_items` - Orders forwarded to suppliers
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p nestling-cli -- migrate
//! ```

pub mod addresses;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod dropship;
pub mod inventory;
pub mod orders;
pub mod registries;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use carts::CartRepository;
pub use catalog::CatalogRepository;
pub use checkout::CheckoutRepository;
pub use dropship::DropshipRepository;
pub use orders::OrderRepository;
pub use registries::RegistryRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or a conditional update that matched no row.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Map a unique-violation into `RepositoryError::Conflict`, everything else into `Database`.
pub(crate) fn map_unique_violation(e: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}

/// Page request for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Rows per page.
    pub size: u32,
}

impl Page {
    /// Largest page size a caller may ask for.
    pub const MAX_SIZE: u32 = 100;

    /// Build a page, clamping the number to at least 1 and the size to `1..=MAX_SIZE`.
    #[must_use]
    pub fn new(number: Option<u32>, size: u32) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    /// `LIMIT` value.
    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.size)
    }

    /// `OFFSET` value.
    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.number.saturating_sub(1)) * i64::from(self.size)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps_inputs() {
        let page = Page::new(Some(0), 500);
        assert_eq!(page.number, 1);
        assert_eq!(page.size, Page::MAX_SIZE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_offset() {
        let page = Page::new(Some(3), 20);
        assert_eq!(page.limit(), 20);
        assert_eq!(page.offset(), 40);
    }
}

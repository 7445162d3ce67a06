//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password accounts and login
//! - `catalog` - Cached catalog reads and stock adjustments
//! - `catalog_sync` - CMS to database sync and search reindex
//! - `cart` - Guest and customer carts
//! - `checkout` - Reserving stock and opening Stripe Checkout Sessions
//! - `orders` - Webhook reconciliation, expiry sweep and admin order updates
//! - `registry` - Gift registries
//! - `dropship` - Forwarding orders to suppliers
//!
//! Services borrow what they need from [`crate::state::AppState`] and are
//! built per request; only the catalog cache lives in the state.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod catalog_sync;
pub mod checkout;
pub mod dropship;
pub mod orders;
pub mod registry;

pub use auth::{AuthError, AuthService};
pub use cart::CartService;
pub use catalog::CatalogService;
pub use catalog_sync::{CatalogSync, SyncError, SyncReport};
pub use checkout::CheckoutService;
pub use dropship::DropshipService;
pub use orders::{Completion, OrderService};
pub use registry::RegistryService;

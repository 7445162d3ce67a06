//! Nestling Core - shared domain library.
//!
//! Types and pure business rules used by the storefront server and the CLI:
//! - [`types`] - typed IDs, emails, money and status enums
//! - [`inventory`] - stock reservation arithmetic
//! - [`pricing`] - order totals (subtotal, shipping, tax)
//! - [`registry`] - shareable registry codes
//! - [`order`] - customer-facing order numbers
//!
//! # Architecture
//!
//! No I/O lives here: no database access, no HTTP clients. The `postgres`
//! feature only adds `sqlx` encode/decode impls so repositories can bind
//! these types directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod inventory;
pub mod order;
pub mod pricing;
pub mod registry;
pub mod types;

pub use inventory::{InventoryError, InventoryLevel};
pub use pricing::{OrderTotals, PricedLine, PricingRules};
pub use registry::{ShareCode, ShareCodeError};
pub use types::*;

//! Core value types for Nestling.
//!
//! Type-safe wrappers for IDs, emails, money and the status enums stored in
//! the `shop` schema.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money, MoneyError};
pub use status::*;

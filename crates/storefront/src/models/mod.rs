//! Domain models for the storefront.
//!
//! Row types derive `sqlx::FromRow` so repositories can use runtime-checked
//! `query_as`; most also derive `Serialize` because the JSON API returns them
//! as-is.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod dropship;
pub mod order;
pub mod registry;
pub mod session;
pub mod user;

pub use address::{Address, AddressInput, ShippingAddress};
pub use cart::{CartLine, CartView};
pub use catalog::{Category, ProductDetail, ProductSummary, SearchRecord, Variant};
pub use checkout::{CheckoutItem, CheckoutSession, NewCheckoutSession};
pub use dropship::{DropshipOrder, DropshipOrderDetail, DropshipOrderLine, Supplier};
pub use order::{
    DashboardMetrics, Order, OrderDetail, OrderItem, OrderSummary, Payment, Shipping,
};
pub use registry::{Registry, RegistryDetail, RegistryItemView};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;

//! Local mirror of payment-provider checkout sessions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use nestling_core::{
    CartId, CheckoutSessionId, CheckoutStatus, CurrencyCode, Email, OrderTotals, RegistryItemId,
    SupplierId, UserId, VariantId,
};

use super::ShippingAddress;

/// A checkout session row.
///
/// Totals are frozen at creation; the order copies them rather than
/// re-pricing the cart.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CheckoutSession {
    pub id: CheckoutSessionId,
    /// Random reference sent to Stripe as `client_reference_id`.
    pub reference: Uuid,
    pub cart_id: Option<CartId>,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub status: CheckoutStatus,
    pub stripe_session_id: Option<String>,
    pub stripe_url: Option<String>,
    pub currency: CurrencyCode,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shipping_address: Json<ShippingAddress>,
    pub analytics_client_id: Option<String>,
    /// Stripe completed the session but an async payment is still clearing.
    pub payment_pending: bool,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of one cart line taken when the session was created.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CheckoutItem {
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub registry_item_id: Option<RegistryItemId>,
    pub supplier_id: Option<SupplierId>,
}

/// Values needed to insert a checkout session.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub reference: Uuid,
    pub cart_id: Option<CartId>,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub totals: OrderTotals,
    pub shipping_address: ShippingAddress,
    pub analytics_client_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

//! Orders, their lines, shipping and payment records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::types::Json;

use nestling_core::{
    CheckoutSessionId, CurrencyCode, Email, FulfillmentStatus, OrderId, OrderItemId, OrderStatus,
    PaymentId, PaymentStatus, RegistryItemId, ShippingId, SupplierId, UserId, VariantId,
    order::order_number,
};

use super::{DropshipOrder, ShippingAddress};

/// An order row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub checkout_session_id: CheckoutSessionId,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub status: OrderStatus,
    pub currency: CurrencyCode,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Customer-facing order number.
    #[must_use]
    pub fn number(&self) -> String {
        order_number(self.id, self.created_at)
    }
}

/// A line on an order, with name and price snapshots.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub registry_item_id: Option<RegistryItemId>,
    pub supplier_id: Option<SupplierId>,
}

/// Shipping row of an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Shipping {
    pub id: ShippingId,
    pub order_id: OrderId,
    pub status: FulfillmentStatus,
    pub address: Json<ShippingAddress>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Payment row of an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order with everything hanging off it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub number: String,
    pub items: Vec<OrderItem>,
    pub shipping: Option<Shipping>,
    pub payments: Vec<Payment>,
    pub dropship_orders: Vec<DropshipOrder>,
}

/// One row of the admin order table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderSummary {
    pub id: OrderId,
    pub email: Email,
    pub status: OrderStatus,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub currency: CurrencyCode,
    pub total: Decimal,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderSummary {
    /// Customer-facing order number.
    #[must_use]
    pub fn number(&self) -> String {
        order_number(self.id, self.created_at)
    }
}

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct DashboardMetrics {
    /// Paid-or-later orders in the last 30 days.
    pub orders_last_30_days: i64,
    /// Revenue of those orders.
    pub revenue_last_30_days: Decimal,
    /// Paid orders not yet shipped.
    pub awaiting_fulfillment: i64,
    /// Dropship orders not yet sent to the supplier.
    pub dropship_pending: i64,
    /// Active variants with nothing available.
    pub out_of_stock_variants: i64,
    /// Open registries.
    pub active_registries: i64,
}

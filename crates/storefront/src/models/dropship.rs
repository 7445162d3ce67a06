//! Suppliers and dropship orders.

use chrono::{DateTime, Utc};
use serde::Serialize;

use nestling_core::{DropshipOrderId, DropshipStatus, Email, OrderId, OrderItemId, SupplierId};

/// A third-party supplier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub email: Email,
    pub lead_time_days: i32,
}

/// The part of an order one supplier ships.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DropshipOrder {
    pub id: DropshipOrderId,
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub status: DropshipStatus,
    pub supplier_reference: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DropshipOrder {
    /// Whether the purchase order still has to be sent.
    #[must_use]
    pub fn can_forward(&self) -> bool {
        self.status == DropshipStatus::Pending
    }

    /// Statuses staff may record next.
    #[must_use]
    pub fn next_statuses(&self) -> Vec<DropshipStatus> {
        DropshipStatus::ALL
            .iter()
            .copied()
            .filter(|next| self.status.can_transition_to(*next))
            .collect()
    }
}

/// A line the supplier must ship.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DropshipOrderLine {
    pub order_item_id: OrderItemId,
    pub sku: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
}

/// A dropship order with its supplier and lines.
#[derive(Debug, Clone, Serialize)]
pub struct DropshipOrderDetail {
    pub dropship_order: DropshipOrder,
    pub supplier: Supplier,
    pub lines: Vec<DropshipOrderLine>,
}

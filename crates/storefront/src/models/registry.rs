//! Gift registries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use nestling_core::{
    ProductId, RegistryEventType, RegistryId, RegistryItemId, RegistryStatus, ShareCode, UserId,
    VariantId, registry::remaining,
};

/// A registry row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Registry {
    pub id: RegistryId,
    pub user_id: UserId,
    pub share_code: ShareCode,
    pub title: String,
    pub event_type: RegistryEventType,
    pub event_date: Option<NaiveDate>,
    pub message: Option<String>,
    pub is_public: bool,
    pub status: RegistryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registry item joined with its variant and product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RegistryItemView {
    pub id: RegistryItemId,
    pub registry_id: RegistryId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_slug: String,
    pub product_name: String,
    pub variant_name: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub quantity_requested: i32,
    pub quantity_purchased: i32,
    pub note: Option<String>,
}

impl RegistryItemView {
    /// Units guests can still buy.
    #[must_use]
    pub const fn remaining(&self) -> i32 {
        remaining(self.quantity_requested, self.quantity_purchased)
    }
}

/// A registry with its items.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryDetail {
    pub registry: Registry,
    pub items: Vec<RegistryItemView>,
}

//! Cart lines and the priced cart view.

use rust_decimal::Decimal;
use serde::Serialize;

use nestling_core::{
    CartId, CartItemId, OrderTotals, PricedLine, ProductId, RegistryItemId, SupplierId, VariantId,
};

/// One cart line joined with its variant and product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_slug: String,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub image_url: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub registry_item_id: Option<RegistryItemId>,
    pub supplier_id: Option<SupplierId>,
    /// Product and variant are both active.
    pub purchasable: bool,
    pub available: i32,
}

impl CartLine {
    /// Unit price times quantity, before tax and shipping.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// The line as input to `pricing::quote`.
    #[must_use]
    pub fn priced(&self) -> PricedLine {
        PricedLine {
            unit_price: self.unit_price,
            quantity: u32::try_from(self.quantity).unwrap_or(0),
        }
    }
}

/// A cart with its lines and quoted totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Option<CartId>,
    pub lines: Vec<CartLine>,
    pub totals: OrderTotals,
    pub item_count: i32,
}

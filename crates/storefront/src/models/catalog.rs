//! Catalog types: categories, products and variants.

use rust_decimal::Decimal;
use serde::Serialize;

use nestling_core::{CategoryId, ProductId, SupplierId, VariantId};

/// A product category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
}

/// A product as shown in listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub image_url: Option<String>,
    pub category_slug: Option<String>,
    /// Lowest active variant price.
    pub price_from: Option<Decimal>,
    /// Whether any active variant can be bought right now.
    pub in_stock: bool,
}

/// A purchasable variant with its current availability.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub is_active: bool,
    /// `quantity - reserved`; zero when no inventory row exists.
    pub available: i32,
}

/// Product detail with all active variants.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductDetail {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category_id: Option<CategoryId>,
    pub category_slug: Option<String>,
    pub supplier_id: Option<SupplierId>,
    pub is_active: bool,
    #[sqlx(skip)]
    pub variants: Vec<Variant>,
}

impl ProductDetail {
    /// Whether this product ships from a third-party supplier.
    #[must_use]
    pub const fn is_dropship(&self) -> bool {
        self.supplier_id.is_some()
    }

    /// Lowest price across variants.
    #[must_use]
    pub fn price_from(&self) -> Option<Decimal> {
        self.variants.iter().map(|v| v.price).min()
    }
}

/// One product flattened for the search index.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SearchRecord {
    /// Index object ID (the product slug).
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub price_from: Option<Decimal>,
    pub skus: Vec<String>,
    pub in_stock: bool,
    #[serde(skip)]
    pub is_active: bool,
}

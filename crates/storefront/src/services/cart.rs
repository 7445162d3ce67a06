//! Cart operations.
//!
//! Routes resolve who owns the cart (guest key from the session, or the
//! logged-in user) and hand a [`CartOwner`] to this service. Guests only get
//! a cart row once they add something.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use nestling_core::{
    CartId, CartItemId, OrderTotals, PricingRules, RegistryItemId, UserId, VariantId, pricing,
};

use crate::db::carts::{CartOwner, CartRepository, MAX_LINE_QUANTITY};
use crate::db::{CatalogRepository, RegistryRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::models::{CartLine, CartView};

/// A request to put units of a variant in the cart.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AddToCart {
    pub variant_id: VariantId,
    pub quantity: i32,
    /// Set when the purchase is a gift from a registry.
    #[serde(default)]
    pub registry_item_id: Option<RegistryItemId>,
}

/// Cart service.
pub struct CartService<'a> {
    pool: &'a PgPool,
    rules: &'a PricingRules,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, rules: &'a PricingRules) -> Self {
        Self { pool, rules }
    }

    /// The owner's cart with quoted totals; empty if no cart exists yet.
    ///
    /// # Errors
    ///
    /// Returns error if the database read fails.
    pub async fn view(&self, owner: Option<CartOwner>) -> Result<CartView> {
        let carts = CartRepository::new(self.pool);
        let Some(owner) = owner else {
            return summarize(None, Vec::new(), self.rules);
        };
        let Some(cart_id) = carts.find(owner).await? else {
            return summarize(None, Vec::new(), self.rules);
        };
        let lines = carts.lines(cart_id).await?;
        summarize(Some(cart_id), lines, self.rules)
    }

    /// Add units of a variant, creating the cart if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an out-of-range quantity,
    /// `AppError::Conflict` if the variant is not for sale or the registry
    /// item does not accept purchases of it.
    #[instrument(skip(self), fields(variant_id = %item.variant_id))]
    pub async fn add(&self, owner: CartOwner, item: AddToCart) -> Result<CartView> {
        let quantity = validate_quantity(item.quantity)?;

        CatalogRepository::new(self.pool)
            .get_purchasable_variant(item.variant_id)
            .await?
            .ok_or_else(|| AppError::Conflict("this item is not available".to_string()))?;

        if let Some(registry_item_id) = item.registry_item_id {
            let (registry_item, status) = RegistryRepository::new(self.pool)
                .get_item_with_status(registry_item_id)
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => {
                        AppError::BadRequest("unknown registry item".to_string())
                    }
                    other => other.into(),
                })?;
            if !status.accepts_purchases() {
                return Err(AppError::Conflict(
                    "this registry is no longer accepting gifts".to_string(),
                ));
            }
            if registry_item.variant_id != item.variant_id {
                return Err(AppError::BadRequest(
                    "registry item is for a different variant".to_string(),
                ));
            }
        }

        let carts = CartRepository::new(self.pool);
        let cart_id = carts.get_or_create(owner).await?;
        carts
            .add_item(cart_id, item.variant_id, quantity, item.registry_item_id)
            .await?;

        let lines = carts.lines(cart_id).await?;
        summarize(Some(cart_id), lines, self.rules)
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an out-of-range quantity and
    /// `AppError::NotFound` if the line is not in the owner's cart.
    pub async fn update(
        &self,
        owner: CartOwner,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartView> {
        let quantity = validate_quantity(quantity)?;
        let carts = CartRepository::new(self.pool);
        let cart_id = carts
            .find(owner)
            .await?
            .ok_or_else(|| AppError::NotFound("cart item not found".to_string()))?;

        carts.set_quantity(cart_id, item_id, quantity).await?;
        let lines = carts.lines(cart_id).await?;
        summarize(Some(cart_id), lines, self.rules)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the line is not in the owner's cart.
    pub async fn remove(&self, owner: CartOwner, item_id: CartItemId) -> Result<CartView> {
        let carts = CartRepository::new(self.pool);
        let cart_id = carts
            .find(owner)
            .await?
            .ok_or_else(|| AppError::NotFound("cart item not found".to_string()))?;

        carts.remove_item(cart_id, item_id).await?;
        let lines = carts.lines(cart_id).await?;
        summarize(Some(cart_id), lines, self.rules)
    }

    /// Fold a guest cart into the user's cart after login.
    ///
    /// # Errors
    ///
    /// Returns error if the merge transaction fails.
    #[instrument(skip(self))]
    pub async fn merge_on_login(&self, guest_key: Uuid, user_id: UserId) -> Result<()> {
        CartRepository::new(self.pool)
            .merge_guest_into_user(guest_key, user_id)
            .await?;
        Ok(())
    }
}

/// Check a requested line quantity.
///
/// # Errors
///
/// Returns `AppError::BadRequest` unless `1 <= quantity <= 99`.
pub fn validate_quantity(quantity: i32) -> Result<i32> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(quantity)
    } else {
        Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )))
    }
}

/// Price a cart's lines.
///
/// # Errors
///
/// Returns `AppError::Internal` on decimal overflow.
pub fn summarize(
    id: Option<CartId>,
    lines: Vec<CartLine>,
    rules: &PricingRules,
) -> Result<CartView> {
    let totals = if lines.is_empty() {
        OrderTotals::zero(rules.currency)
    } else {
        let priced: Vec<_> = lines.iter().map(CartLine::priced).collect();
        pricing::quote(&priced, rules)?
    };
    let item_count = lines.iter().map(|line| line.quantity).sum();

    Ok(CartView {
        id,
        lines,
        totals,
        item_count,
    })
}

/// Lines that cannot be checked out as they stand.
///
/// Dropship lines never block on local stock.
#[must_use]
pub fn unavailable_lines(lines: &[CartLine]) -> Vec<&CartLine> {
    lines
        .iter()
        .filter(|line| {
            !line.purchasable || (line.supplier_id.is_none() && line.available < line.quantity)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use nestling_core::{ProductId, SupplierId};

    use super::*;

    fn line(price: i64, quantity: i32, available: i32) -> CartLine {
        CartLine {
            id: CartItemId::new(1),
            cart_id: CartId::new(1),
            variant_id: VariantId::new(10),
            product_id: ProductId::new(100),
            product_slug: "swaddle".to_string(),
            product_name: "Muslin Swaddle".to_string(),
            variant_name: "Sage".to_string(),
            sku: "SWD-SAGE".to_string(),
            image_url: None,
            unit_price: Decimal::new(price, 2),
            quantity,
            registry_item_id: None,
            supplier_id: None,
            purchasable: true,
            available,
        }
    }

    #[test]
    fn test_validate_quantity_bounds() {
        assert_eq!(validate_quantity(1).unwrap(), 1);
        assert_eq!(validate_quantity(99).unwrap(), 99);
        assert!(matches!(validate_quantity(0), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_quantity(100), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_quantity(-3), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_summarize_empty_cart() {
        let view = summarize(None, Vec::new(), &PricingRules::default()).unwrap();
        assert_eq!(view.item_count, 0);
        assert!(view.totals.total.is_zero());
        assert!(view.totals.shipping.is_zero());
    }

    #[test]
    fn test_summarize_counts_units_and_prices() {
        let lines = vec![line(2500, 2, 10), line(1000, 1, 10)];
        let view = summarize(Some(CartId::new(1)), lines, &PricingRules::default()).unwrap();
        assert_eq!(view.item_count, 3);
        assert_eq!(view.totals.subtotal.display(), "$60.00");
        assert_eq!(view.totals.shipping.display(), "$7.95");
        assert_eq!(view.totals.total.display(), "$67.95");
    }

    #[test]
    fn test_unavailable_lines() {
        let in_stock = line(1000, 2, 2);
        let short = line(1000, 3, 2);
        let mut retired = line(1000, 1, 5);
        retired.purchasable = false;
        let mut dropship = line(1000, 4, 0);
        dropship.supplier_id = Some(SupplierId::new(7));

        let lines = vec![in_stock, short, retired, dropship];
        let blocked = unavailable_lines(&lines);
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[0].quantity, 3);
        assert!(!blocked[1].purchasable);
    }
}

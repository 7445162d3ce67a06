//! Cart repository.
//!
//! A cart belongs either to a guest (identified by a random `session_key`
//! kept in the session) or to a user. On login the guest cart is merged into
//! the user's cart.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use nestling_core::{CartId, CartItemId, RegistryItemId, UserId, VariantId};

use super::RepositoryError;
use crate::models::CartLine;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Who owns a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOwner {
    /// Anonymous visitor.
    Guest(Uuid),
    /// Logged-in user.
    User(UserId),
}

/// Repository for carts and cart lines.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the owner's cart without creating one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(&self, owner: CartOwner) -> Result<Option<CartId>, RepositoryError> {
        let id = match owner {
            CartOwner::Guest(key) => {
                sqlx::query_scalar("SELECT id FROM shop.carts WHERE session_key = $1")
                    .bind(key)
                    .fetch_optional(self.pool)
                    .await?
            }
            CartOwner::User(user_id) => {
                sqlx::query_scalar("SELECT id FROM shop.carts WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(self.pool)
                    .await?
            }
        };
        Ok(id)
    }

    /// Find or create the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, owner: CartOwner) -> Result<CartId, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let id = match owner {
            CartOwner::Guest(key) => {
                sqlx::query_scalar(
                    "INSERT INTO shop.carts (session_key) VALUES ($1) \
                     ON CONFLICT (session_key) DO UPDATE SET updated_at = now() \
                     RETURNING id",
                )
                .bind(key)
                .fetch_one(self.pool)
                .await?
            }
            CartOwner::User(user_id) => {
                sqlx::query_scalar(
                    "INSERT INTO shop.carts (user_id) VALUES ($1) \
                     ON CONFLICT (user_id) DO UPDATE SET updated_at = now() \
                     RETURNING id",
                )
                .bind(user_id)
                .fetch_one(self.pool)
                .await?
            }
        };
        Ok(id)
    }

    /// Cart lines joined with variant, product and availability.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(
            r"
            SELECT ci.id, ci.cart_id, ci.variant_id, p.id AS product_id,
                   p.slug AS product_slug, p.name AS product_name,
                   v.name AS variant_name, v.sku, p.image_url,
                   v.price AS unit_price, ci.quantity, ci.registry_item_id,
                   p.supplier_id,
                   (v.is_active AND p.is_active) AS purchasable,
                   COALESCE(i.available, 0) AS available
            FROM shop.cart_items ci
            JOIN shop.variants v ON v.id = ci.variant_id
            JOIN shop.products p ON p.id = v.product_id
            LEFT JOIN shop.inventory i ON i.variant_id = v.id
            WHERE ci.cart_id = $1
            ORDER BY ci.created_at, ci.id
            ",
        )
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;
        Ok(lines)
    }

    /// Add units of a variant, merging with an existing line for the same
    /// variant and registry item. The merged quantity is capped at
    /// [`MAX_LINE_QUANTITY`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        variant_id: VariantId,
        quantity: i32,
        registry_item_id: Option<RegistryItemId>,
    ) -> Result<CartItemId, RepositoryError> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO shop.cart_items (cart_id, variant_id, quantity, registry_item_id)
            VALUES ($1, $2, LEAST($3, $5), $4)
            ON CONFLICT (cart_id, variant_id, registry_item_id) DO UPDATE SET
                quantity = LEAST(shop.cart_items.quantity + EXCLUDED.quantity, $5),
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(registry_item_id)
        .bind(MAX_LINE_QUANTITY)
        .fetch_one(self.pool)
        .await?;

        touch(self.pool, cart_id).await?;
        Ok(id)
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.cart_items SET quantity = $3, updated_at = now() \
             WHERE id = $1 AND cart_id = $2",
        )
        .bind(item_id)
        .bind(cart_id)
        .bind(quantity)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        touch(self.pool, cart_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        touch(self.pool, cart_id).await
    }

    /// Move a guest cart's lines into the user's cart and drop the guest cart.
    ///
    /// Lines present in both carts are summed and capped at [`MAX_LINE_QUANTITY`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails.
    pub async fn merge_guest_into_user(
        &self,
        guest_key: Uuid,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let guest: Option<CartId> =
            sqlx::query_scalar("SELECT id FROM shop.carts WHERE session_key = $1 FOR UPDATE")
                .bind(guest_key)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(guest_cart) = guest else {
            return Ok(());
        };

        let user_cart: CartId = sqlx::query_scalar(
            "INSERT INTO shop.carts (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET updated_at = now() \
             RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO shop.cart_items (cart_id, variant_id, quantity, registry_item_id)
            SELECT $2, variant_id, quantity, registry_item_id
            FROM shop.cart_items WHERE cart_id = $1
            ON CONFLICT (cart_id, variant_id, registry_item_id) DO UPDATE SET
                quantity = LEAST(shop.cart_items.quantity + EXCLUDED.quantity, $3),
                updated_at = now()
            ",
        )
        .bind(guest_cart)
        .bind(user_cart)
        .bind(MAX_LINE_QUANTITY)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM shop.carts WHERE id = $1")
            .bind(guest_cart)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Delete every line of a cart (after its checkout is paid).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn clear(conn: &mut PgConnection, cart_id: CartId) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM shop.cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn touch(pool: &PgPool, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.carts SET updated_at = now() WHERE id = $1")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(())
}

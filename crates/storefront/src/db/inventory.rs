//! Inventory updates.
//!
//! Every stock change is one conditional `UPDATE` mirroring the arithmetic in
//! [`nestling_core::InventoryLevel`]. The `WHERE` clause carries the guard, so
//! two concurrent checkouts can never both take the last unit: the loser
//! matches zero rows and gets `RepositoryError::Conflict`. The table's CHECK
//! constraints back this up.
//!
//! The functions take a `PgConnection` because they always run inside the
//! caller's transaction (checkout creation, webhook reconciliation, expiry).

use sqlx::PgConnection;

use nestling_core::{InventoryError, InventoryLevel, VariantId};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct LevelRow {
    quantity: i32,
    reserved: i32,
}

impl LevelRow {
    fn into_level(self) -> Result<InventoryLevel, RepositoryError> {
        InventoryLevel::new(self.quantity, self.reserved)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))
    }
}

fn ensure_positive(n: i32) -> Result<(), RepositoryError> {
    if n <= 0 {
        return Err(RepositoryError::Conflict(
            InventoryError::InvalidQuantity(n).to_string(),
        ));
    }
    Ok(())
}

/// Create an empty inventory row for a variant if none exists.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn ensure_row(conn: &mut PgConnection, variant_id: VariantId) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO shop.inventory (variant_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(variant_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Current stock level of a variant.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the variant has no inventory row.
pub async fn get_level(
    conn: &mut PgConnection,
    variant_id: VariantId,
) -> Result<InventoryLevel, RepositoryError> {
    sqlx::query_as::<_, LevelRow>(
        "SELECT quantity, reserved FROM shop.inventory WHERE variant_id = $1",
    )
    .bind(variant_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)?
    .into_level()
}

/// Hold `n` units for a checkout session.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if fewer than `n` units are available.
pub async fn reserve(
    conn: &mut PgConnection,
    variant_id: VariantId,
    n: i32,
) -> Result<InventoryLevel, RepositoryError> {
    ensure_positive(n)?;
    sqlx::query_as::<_, LevelRow>(
        r"
        UPDATE shop.inventory
        SET reserved = reserved + $2, updated_at = now()
        WHERE variant_id = $1 AND quantity - reserved >= $2
        RETURNING quantity, reserved
        ",
    )
    .bind(variant_id)
    .bind(n)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| RepositoryError::Conflict(format!("insufficient stock for variant {variant_id}")))?
    .into_level()
}

/// Return `n` reserved units to the sellable pool.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if fewer than `n` units are reserved.
pub async fn release(
    conn: &mut PgConnection,
    variant_id: VariantId,
    n: i32,
) -> Result<InventoryLevel, RepositoryError> {
    ensure_positive(n)?;
    sqlx::query_as::<_, LevelRow>(
        r"
        UPDATE shop.inventory
        SET reserved = reserved - $2, updated_at = now()
        WHERE variant_id = $1 AND reserved >= $2
        RETURNING quantity, reserved
        ",
    )
    .bind(variant_id)
    .bind(n)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        RepositoryError::Conflict(format!("reservation underflow for variant {variant_id}"))
    })?
    .into_level()
}

/// Consume `n` reserved units for a paid order.
///
/// Both `quantity` and `reserved` drop by `n`, so `available` is unchanged
/// from the moment of reservation and the sale is final.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if fewer than `n` units are reserved.
pub async fn commit(
    conn: &mut PgConnection,
    variant_id: VariantId,
    n: i32,
) -> Result<InventoryLevel, RepositoryError> {
    ensure_positive(n)?;
    sqlx::query_as::<_, LevelRow>(
        r"
        UPDATE shop.inventory
        SET quantity = quantity - $2, reserved = reserved - $2, updated_at = now()
        WHERE variant_id = $1 AND reserved >= $2
        RETURNING quantity, reserved
        ",
    )
    .bind(variant_id)
    .bind(n)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        RepositoryError::Conflict(format!("no reservation to commit for variant {variant_id}"))
    })?
    .into_level()
}

/// Take `n` unreserved units directly (payment arrived after the hold lapsed).
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if fewer than `n` units are available.
pub async fn decrement(
    conn: &mut PgConnection,
    variant_id: VariantId,
    n: i32,
) -> Result<InventoryLevel, RepositoryError> {
    ensure_positive(n)?;
    sqlx::query_as::<_, LevelRow>(
        r"
        UPDATE shop.inventory
        SET quantity = quantity - $2, updated_at = now()
        WHERE variant_id = $1 AND quantity - reserved >= $2
        RETURNING quantity, reserved
        ",
    )
    .bind(variant_id)
    .bind(n)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| RepositoryError::Conflict(format!("insufficient stock for variant {variant_id}")))?
    .into_level()
}

/// Restock (`delta > 0`) or write off (`delta < 0`) on-hand units.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if `delta` is zero or would leave fewer
/// units on hand than are reserved.
pub async fn adjust(
    conn: &mut PgConnection,
    variant_id: VariantId,
    delta: i32,
) -> Result<InventoryLevel, RepositoryError> {
    if delta == 0 {
        return Err(RepositoryError::Conflict(
            InventoryError::InvalidQuantity(0).to_string(),
        ));
    }
    ensure_row(conn, variant_id).await?;
    sqlx::query_as::<_, LevelRow>(
        r"
        UPDATE shop.inventory
        SET quantity = quantity + $2, updated_at = now()
        WHERE variant_id = $1 AND quantity + $2 >= reserved
        RETURNING quantity, reserved
        ",
    )
    .bind(variant_id)
    .bind(delta)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        RepositoryError::Conflict(format!(
            "adjustment of {delta} would drop variant {variant_id} below its reservations"
        ))
    })?
    .into_level()
}

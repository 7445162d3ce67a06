//! Checkout session repository.
//!
//! Rows are written inside the checkout-creation transaction and locked
//! (`FOR UPDATE`) by the webhook and expiry paths, which serializes every
//! state change of one session.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use nestling_core::{CartId, CheckoutSessionId, CheckoutStatus};

use super::RepositoryError;
use crate::models::{CartLine, CheckoutItem, CheckoutSession, NewCheckoutSession};

const SESSION_COLUMNS: &str = "id, reference, cart_id, user_id, email, status, stripe_session_id, \
                               stripe_url, currency, subtotal, shipping, tax, total, \
                               shipping_address, analytics_client_id, payment_pending, \
                               expires_at, completed_at, created_at";

/// Repository for checkout-session reads outside a transaction.
pub struct CheckoutRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CheckoutRepository<'a> {
    /// Create a new checkout repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A session by its Stripe ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_stripe_id(
        &self,
        stripe_session_id: &str,
    ) -> Result<Option<CheckoutSession>, RepositoryError> {
        let session = sqlx::query_as::<_, CheckoutSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM shop.checkout_sessions WHERE stripe_session_id = $1"
        ))
        .bind(stripe_session_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(session)
    }

    /// A cart's open sessions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_open_for_cart(
        &self,
        cart_id: CartId,
    ) -> Result<Vec<CheckoutSession>, RepositoryError> {
        let sessions = sqlx::query_as::<_, CheckoutSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM shop.checkout_sessions \
             WHERE cart_id = $1 AND status = 'open' ORDER BY id"
        ))
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;
        Ok(sessions)
    }

    /// Stripe IDs of open sessions whose hold has lapsed.
    ///
    /// Sessions waiting on an async payment are left out; their outcome
    /// arrives by webhook.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_expired_open(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(CheckoutSessionId, Option<String>)>, RepositoryError> {
        let rows = sqlx::query_as::<_, (CheckoutSessionId, Option<String>)>(
            "SELECT id, stripe_session_id FROM shop.checkout_sessions \
             WHERE status = 'open' AND NOT payment_pending AND expires_at <= $1 \
             ORDER BY expires_at LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

/// Insert a session and snapshot its cart lines.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if an insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    new: &NewCheckoutSession,
    lines: &[CartLine],
) -> Result<CheckoutSession, RepositoryError> {
    let session = sqlx::query_as::<_, CheckoutSession>(&format!(
        "INSERT INTO shop.checkout_sessions \
             (reference, cart_id, user_id, email, currency, subtotal, shipping, tax, total, \
              shipping_address, analytics_client_id, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(new.reference)
    .bind(new.cart_id)
    .bind(new.user_id)
    .bind(&new.email)
    .bind(new.totals.total.currency)
    .bind(new.totals.subtotal.amount)
    .bind(new.totals.shipping.amount)
    .bind(new.totals.tax.amount)
    .bind(new.totals.total.amount)
    .bind(Json(&new.shipping_address))
    .bind(&new.analytics_client_id)
    .bind(new.expires_at)
    .fetch_one(&mut *conn)
    .await?;

    for line in lines {
        sqlx::query(
            r"
            INSERT INTO shop.checkout_items
                (checkout_session_id, variant_id, product_name, variant_name, sku,
                 unit_price, quantity, registry_item_id, supplier_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(session.id)
        .bind(line.variant_id)
        .bind(&line.product_name)
        .bind(&line.variant_name)
        .bind(&line.sku)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.registry_item_id)
        .bind(line.supplier_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(session)
}

/// Record the Stripe session created for a local session.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the session does not exist or is no
/// longer open.
pub async fn attach_stripe_session(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
    stripe_session_id: &str,
    stripe_url: &str,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.checkout_sessions SET stripe_session_id = $2, stripe_url = $3 \
         WHERE id = $1 AND status = 'open'",
    )
    .bind(id)
    .bind(stripe_session_id)
    .bind(stripe_url)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Lock a session by its Stripe ID for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_stripe_id(
    conn: &mut PgConnection,
    stripe_session_id: &str,
) -> Result<Option<CheckoutSession>, RepositoryError> {
    let session = sqlx::query_as::<_, CheckoutSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM shop.checkout_sessions \
         WHERE stripe_session_id = $1 FOR UPDATE"
    ))
    .bind(stripe_session_id)
    .fetch_optional(conn)
    .await?;
    Ok(session)
}

/// Lock a cart's open sessions for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_open_for_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<CheckoutSession>, RepositoryError> {
    let sessions = sqlx::query_as::<_, CheckoutSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM shop.checkout_sessions \
         WHERE cart_id = $1 AND status = 'open' ORDER BY id FOR UPDATE"
    ))
    .bind(cart_id)
    .fetch_all(conn)
    .await?;
    Ok(sessions)
}

/// Flag an open session as waiting on an async payment.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn mark_payment_pending(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.checkout_sessions SET payment_pending = TRUE \
         WHERE id = $1 AND status = 'open'",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lock a session by its local ID for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_id(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
) -> Result<Option<CheckoutSession>, RepositoryError> {
    let session = sqlx::query_as::<_, CheckoutSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM shop.checkout_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(session)
}

/// The line snapshot of a session.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
) -> Result<Vec<CheckoutItem>, RepositoryError> {
    let items = sqlx::query_as::<_, CheckoutItem>(
        "SELECT variant_id, product_name, variant_name, sku, unit_price, quantity, \
                registry_item_id, supplier_id \
         FROM shop.checkout_items WHERE checkout_session_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Move a session out of `open`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the session was not open.
pub async fn close(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
    status: CheckoutStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.checkout_sessions \
         SET status = $2, completed_at = CASE WHEN $2 = 'completed'::shop.checkout_status \
                                              THEN now() ELSE completed_at END \
         WHERE id = $1 AND status = 'open'",
    )
    .bind(id)
    .bind(status)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "checkout session {id} is no longer open"
        )));
    }
    Ok(())
}

/// Mark an expired session completed (late payment).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn complete_expired(
    conn: &mut PgConnection,
    id: CheckoutSessionId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.checkout_sessions SET status = 'completed', completed_at = now() \
         WHERE id = $1 AND status = 'expired'",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

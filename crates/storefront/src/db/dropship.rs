//! Supplier and dropship order repository.

use sqlx::{PgConnection, PgPool};

use nestling_core::{DropshipOrderId, DropshipStatus, OrderId, SupplierId};

use super::{Page, RepositoryError};
use crate::models::{DropshipOrder, DropshipOrderDetail, DropshipOrderLine, OrderItem, Supplier};

const DROPSHIP_SELECT: &str = r"
    SELECT d.id, d.order_id, d.supplier_id, s.name AS supplier_name, d.status,
           d.supplier_reference, d.carrier, d.tracking_number, d.submitted_at,
           d.shipped_at, d.created_at, d.updated_at
    FROM shop.dropship_orders d
    JOIN shop.suppliers s ON s.id = d.supplier_id
";

/// Supplier-side details recorded on a status change.
#[derive(Debug, Clone, Default)]
pub struct DropshipUpdate {
    pub supplier_reference: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Repository for suppliers and dropship orders.
pub struct DropshipRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DropshipRepository<'a> {
    /// Create a new dropship repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All suppliers by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_suppliers(&self) -> Result<Vec<Supplier>, RepositoryError> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT id, name, email, lead_time_days FROM shop.suppliers ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(suppliers)
    }

    /// One supplier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_supplier(&self, id: SupplierId) -> Result<Supplier, RepositoryError> {
        sqlx::query_as::<_, Supplier>(
            "SELECT id, name, email, lead_time_days FROM shop.suppliers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Dropship orders, oldest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<DropshipStatus>,
        page: Page,
    ) -> Result<Vec<DropshipOrder>, RepositoryError> {
        let orders = sqlx::query_as::<_, DropshipOrder>(&format!(
            "{DROPSHIP_SELECT} \
             WHERE ($1::shop.dropship_status IS NULL OR d.status = $1) \
             ORDER BY d.created_at, d.id LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(orders)
    }

    /// Dropship orders belonging to one order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<DropshipOrder>, RepositoryError> {
        let orders = sqlx::query_as::<_, DropshipOrder>(&format!(
            "{DROPSHIP_SELECT} WHERE d.order_id = $1 ORDER BY d.id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(orders)
    }

    /// A dropship order with its supplier and lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_detail(
        &self,
        id: DropshipOrderId,
    ) -> Result<DropshipOrderDetail, RepositoryError> {
        let dropship_order = sqlx::query_as::<_, DropshipOrder>(&format!(
            "{DROPSHIP_SELECT} WHERE d.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let supplier = self.get_supplier(dropship_order.supplier_id).await?;

        let lines = sqlx::query_as::<_, DropshipOrderLine>(
            r"
            SELECT oi.id AS order_item_id, oi.sku, oi.product_name, oi.variant_name, di.quantity
            FROM shop.dropship_order_items di
            JOIN shop.order_items oi ON oi.id = di.order_item_id
            WHERE di.dropship_order_id = $1
            ORDER BY oi.id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(DropshipOrderDetail {
            dropship_order,
            supplier,
            lines,
        })
    }
}

/// Create one dropship order per supplier for the supplier-fulfilled lines of an order.
///
/// Returns the IDs of the dropship orders created.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if an insert fails.
pub async fn create_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    items: &[OrderItem],
) -> Result<Vec<DropshipOrderId>, RepositoryError> {
    let mut created: Vec<(SupplierId, DropshipOrderId)> = Vec::new();

    for item in items {
        let Some(supplier_id) = item.supplier_id else {
            continue;
        };

        let dropship_id = if let Some((_, id)) = created.iter().find(|(s, _)| *s == supplier_id) {
            *id
        } else {
            let id: DropshipOrderId = sqlx::query_scalar(
                "INSERT INTO shop.dropship_orders (order_id, supplier_id) VALUES ($1, $2) \
                 ON CONFLICT (order_id, supplier_id) DO UPDATE SET updated_at = now() \
                 RETURNING id",
            )
            .bind(order_id)
            .bind(supplier_id)
            .fetch_one(&mut *conn)
            .await?;
            created.push((supplier_id, id));
            id
        };

        sqlx::query(
            "INSERT INTO shop.dropship_order_items (dropship_order_id, order_item_id, quantity) \
             VALUES ($1, $2, $3)",
        )
        .bind(dropship_id)
        .bind(item.id)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(created.into_iter().map(|(_, id)| id).collect())
}

/// Lock a dropship order for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist.
pub async fn lock(
    conn: &mut PgConnection,
    id: DropshipOrderId,
) -> Result<DropshipOrder, RepositoryError> {
    sqlx::query_as::<_, DropshipOrder>(&format!(
        "{DROPSHIP_SELECT} WHERE d.id = $1 FOR UPDATE OF d"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Move a dropship order from `from` to `to`, recording supplier details.
///
/// Stamps `submitted_at` and `shipped_at` the first time those states are reached.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the status changed concurrently.
pub async fn update_status(
    conn: &mut PgConnection,
    id: DropshipOrderId,
    from: DropshipStatus,
    to: DropshipStatus,
    update: &DropshipUpdate,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.dropship_orders SET \
             status = $3, \
             supplier_reference = COALESCE($4, supplier_reference), \
             carrier = COALESCE($5, carrier), \
             tracking_number = COALESCE($6, tracking_number), \
             submitted_at = CASE WHEN $3 = 'submitted'::shop.dropship_status \
                                 THEN COALESCE(submitted_at, now()) ELSE submitted_at END, \
             shipped_at = CASE WHEN $3 = 'shipped'::shop.dropship_status \
                               THEN COALESCE(shipped_at, now()) ELSE shipped_at END, \
             updated_at = now() \
         WHERE id = $1 AND status = $2",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(&update.supplier_reference)
    .bind(&update.carrier)
    .bind(&update.tracking_number)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "dropship order {id} is no longer {from}"
        )));
    }
    Ok(())
}

/// Statuses of every dropship order belonging to an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn statuses_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<DropshipStatus>, RepositoryError> {
    let statuses = sqlx::query_scalar("SELECT status FROM shop.dropship_orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(statuses)
}

/// Whether an order has any lines shipped from owned stock.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn has_owned_stock_lines(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<bool, RepositoryError> {
    let exists = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM shop.order_items WHERE order_id = $1 AND supplier_id IS NULL)",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

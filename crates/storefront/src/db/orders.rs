//! Order repository.
//!
//! Order creation is split into per-table inserts that take a connection so
//! the reconciliation service can run them in one transaction. Reads and
//! admin updates go through [`OrderRepository`].

use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use nestling_core::{
    CheckoutSessionId, CurrencyCode, FulfillmentStatus, OrderId, OrderStatus, PaymentStatus,
    UserId,
};

use super::{Page, RepositoryError, map_unique_violation};
use crate::models::{
    CheckoutItem, CheckoutSession, DashboardMetrics, Order, OrderDetail, OrderItem, OrderSummary,
    Payment, Shipping, ShippingAddress,
};

const ORDER_COLUMNS: &str = "id, checkout_session_id, user_id, email, status, currency, \
                             subtotal, shipping, tax, total, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, variant_id, product_name, variant_name, sku, \
                            unit_price, quantity, line_total, registry_item_id, supplier_id";

const SHIPPING_COLUMNS: &str = "id, order_id, status, address, carrier, tracking_number, \
                                shipped_at, delivered_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, provider, provider_payment_id, status, amount, \
                               currency, created_at, updated_at";

/// Repository for order reads and admin updates.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// An order with items, shipping, payments and dropship orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn get_detail(&self, id: OrderId) -> Result<OrderDetail, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        self.load_detail(order).await
    }

    /// A user's own order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or
    /// belongs to someone else.
    pub async fn get_detail_for_user(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<OrderDetail, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        self.load_detail(order).await
    }

    /// The order created from a checkout session, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_checkout_session(
        &self,
        checkout_session_id: CheckoutSessionId,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE checkout_session_id = $1"
        ))
        .bind(checkout_session_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }

    async fn load_detail(&self, order: Order) -> Result<OrderDetail, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.id)
        .fetch_all(self.pool)
        .await?;

        let shipping = sqlx::query_as::<_, Shipping>(&format!(
            "SELECT {SHIPPING_COLUMNS} FROM shop.shipping WHERE order_id = $1"
        ))
        .bind(order.id)
        .fetch_optional(self.pool)
        .await?;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM shop.payments WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.id)
        .fetch_all(self.pool)
        .await?;

        let dropship_orders = super::DropshipRepository::new(self.pool)
            .list_for_order(order.id)
            .await?;

        Ok(OrderDetail {
            number: order.number(),
            order,
            items,
            shipping,
            payments,
            dropship_orders,
        })
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        self.list(Some(user_id), None, Page::new(None, Page::MAX_SIZE))
            .await
            .map(|(orders, _)| orders)
    }

    /// Orders for the admin table, optionally filtered by status.
    ///
    /// Returns one page and the total number of matching orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_admin(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<OrderSummary>, i64), RepositoryError> {
        self.list(None, status, page).await
    }

    async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<OrderSummary>, i64), RepositoryError> {
        let orders = sqlx::query_as::<_, OrderSummary>(
            r"
            SELECT o.id, o.email, o.status, s.status AS fulfillment_status, o.currency,
                   o.total, COALESCE(SUM(oi.quantity), 0)::BIGINT AS item_count, o.created_at
            FROM shop.orders o
            LEFT JOIN shop.shipping s ON s.order_id = o.id
            LEFT JOIN shop.order_items oi ON oi.order_id = o.id
            WHERE ($1::INTEGER IS NULL OR o.user_id = $1)
              AND ($2::shop.order_status IS NULL OR o.status = $2)
            GROUP BY o.id, s.status
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(user_id)
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.orders \
             WHERE ($1::INTEGER IS NULL OR user_id = $1) \
               AND ($2::shop.order_status IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok((orders, total))
    }

    /// Change an order's status if it is still `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status changed concurrently.
    pub async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), RepositoryError> {
        update_order_status(&mut *self.pool.acquire().await?, id, from, to).await
    }

    /// Record fulfillment progress on an order's shipping row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the shipping status changed concurrently,
    /// `RepositoryError::NotFound` if the order has no shipping row.
    pub async fn update_fulfillment(
        &self,
        order_id: OrderId,
        from: FulfillmentStatus,
        update: &FulfillmentUpdate,
    ) -> Result<Shipping, RepositoryError> {
        update_fulfillment(&mut *self.pool.acquire().await?, order_id, from, update).await
    }

    /// Current shipping row of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order has no shipping row.
    pub async fn get_shipping(&self, order_id: OrderId) -> Result<Shipping, RepositoryError> {
        sqlx::query_as::<_, Shipping>(&format!(
            "SELECT {SHIPPING_COLUMNS} FROM shop.shipping WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Set the status of the payment with this provider ID.
    ///
    /// Returns the affected order, or `None` if no payment matches.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_payment_status(
        &self,
        provider_payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        update_payment_status(&mut conn, provider_payment_id, status).await
    }

    /// Headline numbers for the admin dashboard.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn dashboard_metrics(&self) -> Result<DashboardMetrics, RepositoryError> {
        let metrics = sqlx::query_as::<_, DashboardMetrics>(
            r"
            SELECT
                (SELECT COUNT(*) FROM shop.orders
                  WHERE created_at > now() - INTERVAL '30 days'
                    AND status NOT IN ('pending', 'cancelled')) AS orders_last_30_days,
                (SELECT COALESCE(SUM(total), 0) FROM shop.orders
                  WHERE created_at > now() - INTERVAL '30 days'
                    AND status NOT IN ('pending', 'cancelled', 'refunded')) AS revenue_last_30_days,
                (SELECT COUNT(*) FROM shop.orders
                  WHERE status IN ('paid', 'processing')) AS awaiting_fulfillment,
                (SELECT COUNT(*) FROM shop.dropship_orders
                  WHERE status = 'pending') AS dropship_pending,
                (SELECT COUNT(*) FROM shop.variants v
                   JOIN shop.products p ON p.id = v.product_id
                   LEFT JOIN shop.inventory i ON i.variant_id = v.id
                  WHERE v.is_active AND p.is_active AND p.supplier_id IS NULL
                    AND COALESCE(i.available, 0) <= 0) AS out_of_stock_variants,
                (SELECT COUNT(*) FROM shop.registries
                  WHERE status = 'active') AS active_registries
            ",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(metrics)
    }
}

/// Carrier and tracking details for a fulfillment change.
#[derive(Debug, Clone)]
pub struct FulfillmentUpdate {
    pub status: FulfillmentStatus,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Insert the order for a checkout session.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if an order already exists for the session.
pub async fn insert_order(
    conn: &mut PgConnection,
    session: &CheckoutSession,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO shop.orders \
             (checkout_session_id, user_id, email, status, currency, subtotal, shipping, tax, total) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(session.id)
    .bind(session.user_id)
    .bind(&session.email)
    .bind(status)
    .bind(session.currency)
    .bind(session.subtotal)
    .bind(session.shipping)
    .bind(session.tax)
    .bind(session.total)
    .fetch_one(conn)
    .await
    .map_err(|e| map_unique_violation(e, "order already exists for checkout session"))
}

/// Insert one order line from a checkout snapshot.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &CheckoutItem,
) -> Result<OrderItem, RepositoryError> {
    let line_total = item.unit_price * Decimal::from(item.quantity);
    let row = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO shop.order_items \
             (order_id, variant_id, product_name, variant_name, sku, unit_price, quantity, \
              line_total, registry_item_id, supplier_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(order_id)
    .bind(item.variant_id)
    .bind(&item.product_name)
    .bind(&item.variant_name)
    .bind(&item.sku)
    .bind(item.unit_price)
    .bind(item.quantity)
    .bind(line_total)
    .bind(item.registry_item_id)
    .bind(item.supplier_id)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Insert the shipping row of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_shipping(
    conn: &mut PgConnection,
    order_id: OrderId,
    address: &ShippingAddress,
) -> Result<Shipping, RepositoryError> {
    let row = sqlx::query_as::<_, Shipping>(&format!(
        "INSERT INTO shop.shipping (order_id, address) VALUES ($1, $2) \
         RETURNING {SHIPPING_COLUMNS}"
    ))
    .bind(order_id)
    .bind(Json(address))
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Insert a payment row.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the provider payment ID is already recorded.
pub async fn insert_payment(
    conn: &mut PgConnection,
    order_id: OrderId,
    provider_payment_id: Option<&str>,
    status: PaymentStatus,
    amount: Decimal,
    currency: CurrencyCode,
) -> Result<Payment, RepositoryError> {
    sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO shop.payments (order_id, provider_payment_id, status, amount, currency) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(order_id)
    .bind(provider_payment_id)
    .bind(status)
    .bind(amount)
    .bind(currency)
    .fetch_one(conn)
    .await
    .map_err(|e| map_unique_violation(e, "payment already recorded"))
}

/// Change an order's status if it is still `from`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the status changed concurrently.
pub async fn update_order_status(
    conn: &mut PgConnection,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.orders SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "order {id} is no longer {from}"
        )));
    }
    Ok(())
}

/// Apply a fulfillment change if the shipping row is still `from`.
///
/// `shipped_at` and `delivered_at` are stamped the first time the row reaches
/// those statuses. Carrier and tracking values are only overwritten when given.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the status changed concurrently.
pub async fn update_fulfillment(
    conn: &mut PgConnection,
    order_id: OrderId,
    from: FulfillmentStatus,
    update: &FulfillmentUpdate,
) -> Result<Shipping, RepositoryError> {
    sqlx::query_as::<_, Shipping>(&format!(
        "UPDATE shop.shipping SET \
             status = $3, \
             carrier = COALESCE($4, carrier), \
             tracking_number = COALESCE($5, tracking_number), \
             shipped_at = CASE WHEN $3 = 'shipped'::shop.fulfillment_status \
                               THEN COALESCE(shipped_at, now()) ELSE shipped_at END, \
             delivered_at = CASE WHEN $3 = 'delivered'::shop.fulfillment_status \
                                 THEN COALESCE(delivered_at, now()) ELSE delivered_at END, \
             updated_at = now() \
         WHERE order_id = $1 AND status = $2 \
         RETURNING {SHIPPING_COLUMNS}"
    ))
    .bind(order_id)
    .bind(from)
    .bind(update.status)
    .bind(&update.carrier)
    .bind(&update.tracking_number)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        RepositoryError::Conflict(format!("shipping for order {order_id} is no longer {from}"))
    })
}

/// Set the status of the payment with this provider ID, returning its order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn update_payment_status(
    conn: &mut PgConnection,
    provider_payment_id: &str,
    status: PaymentStatus,
) -> Result<Option<OrderId>, RepositoryError> {
    let order_id = sqlx::query_scalar(
        "UPDATE shop.payments SET status = $2, updated_at = now() \
         WHERE provider_payment_id = $1 RETURNING order_id",
    )
    .bind(provider_payment_id)
    .bind(status)
    .fetch_optional(conn)
    .await?;
    Ok(order_id)
}

/// Lock an order row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Current shipping status of an order, if it has a shipping row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn shipping_status(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Option<FulfillmentStatus>, RepositoryError> {
    let status = sqlx::query_scalar("SELECT status FROM shop.shipping WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(status)
}

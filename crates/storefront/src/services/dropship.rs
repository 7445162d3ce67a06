//! Dropship fulfillment.
//!
//! A paid order gets one dropship order per supplier. Staff forward each one
//! (which emails the supplier a purchase order) and then record the
//! supplier's progress. Once every dropship order of an order has shipped and
//! the order has no lines shipped from owned stock, its shipping row is
//! marked shipped and the customer is told.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::instrument;

use nestling_core::{DropshipOrderId, DropshipStatus, FulfillmentStatus};

use crate::db::dropship::{self, DropshipUpdate};
use crate::db::orders::FulfillmentUpdate;
use crate::db::{DropshipRepository, OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::integrations::EmailService;
use crate::models::{DropshipOrderDetail, Shipping};
use crate::services::orders::{notify_shipped, ship};

/// A status change submitted by staff.
#[derive(Debug, Clone, Deserialize)]
pub struct DropshipStatusChange {
    pub status: DropshipStatus,
    #[serde(default)]
    pub supplier_reference: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl DropshipStatusChange {
    fn update(&self) -> DropshipUpdate {
        DropshipUpdate {
            supplier_reference: non_blank(self.supplier_reference.as_deref()),
            carrier: non_blank(self.carrier.as_deref()),
            tracking_number: non_blank(self.tracking_number.as_deref()),
        }
    }
}

/// Dropship service.
pub struct DropshipService<'a> {
    pool: &'a PgPool,
    email: Option<&'a EmailService>,
}

impl<'a> DropshipService<'a> {
    /// Create a new dropship service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, email: Option<&'a EmailService>) -> Self {
        Self { pool, email }
    }

    /// Email the supplier a purchase order and mark the dropship order
    /// submitted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the order was already forwarded or
    /// email is not configured, and `AppError::Integration` if sending fails.
    #[instrument(skip(self))]
    pub async fn forward(&self, id: DropshipOrderId) -> Result<DropshipOrderDetail> {
        let email = self
            .email
            .ok_or_else(|| AppError::Conflict("email is not configured".to_string()))?;

        let detail = DropshipRepository::new(self.pool).get_detail(id).await?;
        let order = OrderRepository::new(self.pool)
            .get_detail(detail.dropship_order.order_id)
            .await?;
        let shipping = order.shipping.as_ref().ok_or_else(|| {
            AppError::Internal(format!("order {} has no shipping address", order.order.id))
        })?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let current = dropship::lock(&mut tx, id).await?;
        current.status.ensure_transition(DropshipStatus::Submitted)?;

        email
            .send_supplier_purchase_order(&detail, &order.number, &shipping.address)
            .await
            .map_err(|e| AppError::Integration(e.to_string()))?;

        dropship::update_status(
            &mut tx,
            id,
            current.status,
            DropshipStatus::Submitted,
            &DropshipUpdate::default(),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            dropship_order_id = %id,
            supplier_id = %detail.supplier.id,
            "Dropship order forwarded"
        );
        Ok(DropshipRepository::new(self.pool).get_detail(id).await?)
    }

    /// Record supplier progress on a dropship order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` for a disallowed transition and
    /// `AppError::NotFound` for an unknown dropship order.
    #[instrument(skip(self, change), fields(to = %change.status))]
    pub async fn set_status(
        &self,
        id: DropshipOrderId,
        change: &DropshipStatusChange,
    ) -> Result<DropshipOrderDetail> {
        let update = change.update();

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let current = dropship::lock(&mut tx, id).await?;
        current.status.ensure_transition(change.status)?;
        dropship::update_status(&mut tx, id, current.status, change.status, &update).await?;

        let order_id = current.order_id;
        let mut shipped: Option<Shipping> = None;
        if change.status.is_shipped() {
            let statuses = dropship::statuses_for_order(&mut tx, order_id).await?;
            let owned_lines = dropship::has_owned_stock_lines(&mut tx, order_id).await?;
            let shipping_status = crate::db::orders::shipping_status(&mut tx, order_id).await?;

            if should_ship_order(&statuses, owned_lines, shipping_status) {
                shipped = Some(
                    ship(
                        &mut tx,
                        order_id,
                        &FulfillmentUpdate {
                            status: FulfillmentStatus::Shipped,
                            carrier: update.carrier.clone(),
                            tracking_number: update.tracking_number.clone(),
                        },
                    )
                    .await?,
                );
            }
        }
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            dropship_order_id = %id,
            from = %current.status,
            to = %change.status,
            "Dropship status changed"
        );

        if let Some(shipping) = shipped {
            let detail = OrderRepository::new(self.pool).get_detail(order_id).await?;
            notify_shipped(self.email, &detail, &shipping).await;
        }

        Ok(DropshipRepository::new(self.pool).get_detail(id).await?)
    }
}

/// Whether an order's shipping row should move to shipped after a dropship
/// order shipped.
#[must_use]
pub fn should_ship_order(
    dropship_statuses: &[DropshipStatus],
    has_owned_stock_lines: bool,
    shipping_status: Option<FulfillmentStatus>,
) -> bool {
    !dropship_statuses.is_empty()
        && dropship_statuses.iter().all(|status| status.is_shipped())
        && !has_owned_stock_lines
        && shipping_status.is_some_and(|s| s.can_transition_to(FulfillmentStatus::Shipped))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ships_when_every_dropship_order_shipped() {
        let statuses = [DropshipStatus::Shipped, DropshipStatus::Delivered];
        assert!(should_ship_order(
            &statuses,
            false,
            Some(FulfillmentStatus::Unfulfilled)
        ));
    }

    #[test]
    fn test_waits_for_other_suppliers() {
        let statuses = [DropshipStatus::Shipped, DropshipStatus::Submitted];
        assert!(!should_ship_order(
            &statuses,
            false,
            Some(FulfillmentStatus::Unfulfilled)
        ));
    }

    #[test]
    fn test_mixed_orders_left_to_staff() {
        assert!(!should_ship_order(
            &[DropshipStatus::Shipped],
            true,
            Some(FulfillmentStatus::Processing)
        ));
    }

    #[test]
    fn test_already_shipped_order_untouched() {
        assert!(!should_ship_order(
            &[DropshipStatus::Shipped],
            false,
            Some(FulfillmentStatus::Shipped)
        ));
        assert!(!should_ship_order(&[DropshipStatus::Shipped], false, None));
    }

    #[test]
    fn test_status_change_trims_blank_fields() {
        let change = DropshipStatusChange {
            status: DropshipStatus::Shipped,
            supplier_reference: Some("  ".to_string()),
            carrier: Some(" UPS ".to_string()),
            tracking_number: None,
        };
        let update = change.update();
        assert_eq!(update.supplier_reference, None);
        assert_eq!(update.carrier.as_deref(), Some("UPS"));
    }
}

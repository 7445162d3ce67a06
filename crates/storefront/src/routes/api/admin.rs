//! Admin JSON API: orders, dropship and stock.
//!
//! Every handler takes `RequireAdmin` even though the route policy already
//! closes `/api/admin/`.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use nestling_core::{
    DropshipOrderId, DropshipStatus, FulfillmentStatus, InventoryLevel, OrderId, OrderStatus,
    VariantId,
};

use crate::db::orders::FulfillmentUpdate;
use crate::db::{DropshipRepository, OrderRepository, Page};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{DropshipOrder, DropshipOrderDetail, OrderDetail, Supplier};
use crate::routes::api::account::OrderListItem;
use crate::services::dropship::DropshipStatusChange;
use crate::state::AppState;

/// Rows per admin list page.
pub const ADMIN_PAGE_SIZE: u32 = 50;

/// Largest single stock adjustment.
pub const MAX_ADJUSTMENT: i32 = 10_000;

/// Query for admin order lists.
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
}

/// One page of orders.
#[derive(Serialize)]
pub struct OrderListPage {
    pub orders: Vec<OrderListItem>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/// Body of `POST /api/admin/orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Body of `POST /api/admin/orders/{id}/fulfillment`.
#[derive(Debug, Deserialize)]
pub struct FulfillmentChange {
    pub status: FulfillmentStatus,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl From<FulfillmentChange> for FulfillmentUpdate {
    fn from(change: FulfillmentChange) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            status: change.status,
            carrier: clean(change.carrier),
            tracking_number: clean(change.tracking_number),
        }
    }
}

/// Query for the dropship queue.
#[derive(Debug, Deserialize)]
pub struct DropshipQuery {
    pub status: Option<DropshipStatus>,
    pub page: Option<u32>,
}

/// Body of `POST /api/admin/inventory/{variant_id}/adjust`.
#[derive(Debug, Deserialize)]
pub struct InventoryAdjustment {
    /// Units to add (positive) or write off (negative).
    pub delta: i32,
}

/// Check a stock adjustment.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a zero or oversized delta.
pub fn validate_adjustment(delta: i32) -> Result<i32> {
    if delta == 0 || delta.unsigned_abs() > MAX_ADJUSTMENT.unsigned_abs() {
        return Err(AppError::BadRequest(format!(
            "delta must be non-zero and at most {MAX_ADJUSTMENT} in size"
        )));
    }
    Ok(delta)
}

// =============================================================================
// Orders
// =============================================================================

/// `GET /api/admin/orders`
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListPage>> {
    let page = Page::new(query.page, ADMIN_PAGE_SIZE);
    let (orders, total) = OrderRepository::new(state.pool())
        .list_for_admin(query.status, page)
        .await?;
    Ok(Json(OrderListPage {
        orders: orders.into_iter().map(OrderListItem::from).collect(),
        page: page.number,
        per_page: page.size,
        total,
    }))
}

/// `GET /api/admin/orders/{id}`
pub async fn order(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(OrderRepository::new(state.pool()).get_detail(id).await?))
}

/// `POST /api/admin/orders/{id}/status`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(state.orders().update_status(id, change.status).await?))
}

/// `POST /api/admin/orders/{id}/fulfillment`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_fulfillment(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(change): Json<FulfillmentChange>,
) -> Result<Json<OrderDetail>> {
    let update = FulfillmentUpdate::from(change);
    Ok(Json(state.orders().update_fulfillment(id, &update).await?))
}

// =============================================================================
// Dropship
// =============================================================================

/// `GET /api/admin/dropship`
pub async fn dropship_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<DropshipQuery>,
) -> Result<Json<Vec<DropshipOrder>>> {
    let page = Page::new(query.page, ADMIN_PAGE_SIZE);
    Ok(Json(
        DropshipRepository::new(state.pool())
            .list(query.status, page)
            .await?,
    ))
}

/// `GET /api/admin/suppliers`
pub async fn suppliers(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<Supplier>>> {
    Ok(Json(
        DropshipRepository::new(state.pool())
            .list_suppliers()
            .await?,
    ))
}

/// `POST /api/admin/dropship/{id}/forward`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn forward_dropship(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DropshipOrderId>,
) -> Result<Json<DropshipOrderDetail>> {
    Ok(Json(state.dropship().forward(id).await?))
}

/// `POST /api/admin/dropship/{id}/status`
#[instrument(skip(state, admin, change), fields(admin_id = %admin.id))]
pub async fn update_dropship_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DropshipOrderId>,
    Json(change): Json<DropshipStatusChange>,
) -> Result<Json<DropshipOrderDetail>> {
    Ok(Json(state.dropship().set_status(id, &change).await?))
}

// =============================================================================
// Inventory
// =============================================================================

/// `POST /api/admin/inventory/{variant_id}/adjust`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(variant_id): Path<VariantId>,
    Json(body): Json<InventoryAdjustment>,
) -> Result<Json<InventoryLevel>> {
    let delta = validate_adjustment(body.delta)?;
    Ok(Json(
        state.catalog().adjust_inventory(variant_id, delta).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjustment_bounds() {
        assert_eq!(validate_adjustment(12).ok(), Some(12));
        assert_eq!(validate_adjustment(-3).ok(), Some(-3));
        assert!(validate_adjustment(0).is_err());
        assert!(validate_adjustment(MAX_ADJUSTMENT + 1).is_err());
        assert!(validate_adjustment(i32::MIN).is_err());
    }

    #[test]
    fn test_fulfillment_change_trims_blanks() {
        let update = FulfillmentUpdate::from(FulfillmentChange {
            status: FulfillmentStatus::Shipped,
            carrier: Some(" USPS ".to_string()),
            tracking_number: Some(String::new()),
        });
        assert_eq!(update.carrier.as_deref(), Some("USPS"));
        assert_eq!(update.tracking_number, None);
    }
}

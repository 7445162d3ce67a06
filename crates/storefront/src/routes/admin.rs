//! Admin dashboard pages.
//!
//! Server-rendered views over the same services as `/api/admin`. Every form
//! posts back and redirects with a `?success=` or `?error=` message.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::instrument;

use nestling_core::{DropshipOrderId, DropshipStatus, FulfillmentStatus, OrderId, OrderStatus};

use crate::db::orders::FulfillmentUpdate;
use crate::db::{DropshipRepository, OrderRepository, Page};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{CurrentUser, DashboardMetrics, DropshipOrder, OrderDetail, OrderSummary};
use crate::routes::api::admin::{ADMIN_PAGE_SIZE, FulfillmentChange};
use crate::routes::catalog::has_next_page;
use crate::routes::{PageResult, redirect_with};
use crate::services::dropship::DropshipStatusChange;
use crate::state::AppState;

// =============================================================================
// Query and Form Types
// =============================================================================

/// Messages passed back to admin pages.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Filters for the order list. Blank values mean "any".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub status: String,
    pub page: Option<u32>,
}

/// Filters for the dropship queue.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DropshipFilter {
    pub status: String,
    pub page: Option<u32>,
}

/// Order status form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
}

/// Parse an optional status filter, treating blank as "any".
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unknown status.
pub fn parse_filter<T>(value: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(AppError::BadRequest)
}

// =============================================================================
// Templates
// =============================================================================

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub user: Option<CurrentUser>,
    pub metrics: DashboardMetrics,
    /// Most recent orders.
    pub orders: Vec<OrderSummary>,
}

/// Order list template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct OrdersTemplate {
    pub user: Option<CurrentUser>,
    pub orders: Vec<OrderSummary>,
    pub statuses: &'static [OrderStatus],
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub total: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl OrdersTemplate {
    /// Query string value of the active filter.
    #[must_use]
    pub fn status_param(&self) -> &'static str {
        self.status.map_or("", OrderStatus::as_str)
    }
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/order.html")]
pub struct OrderTemplate {
    pub user: Option<CurrentUser>,
    pub detail: OrderDetail,
    pub next_statuses: Vec<OrderStatus>,
    pub fulfillment_statuses: Vec<FulfillmentStatus>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Dropship queue template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dropship.html")]
pub struct DropshipTemplate {
    pub user: Option<CurrentUser>,
    pub orders: Vec<DropshipOrder>,
    pub statuses: &'static [DropshipStatus],
    pub status: Option<DropshipStatus>,
    pub page: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl DropshipTemplate {
    /// Query string value of the active filter.
    #[must_use]
    pub fn status_param(&self) -> &'static str {
        self.status.map_or("", DropshipStatus::as_str)
    }
}

/// Statuses an admin may move an order to from `current`.
#[must_use]
pub fn next_order_statuses(current: OrderStatus) -> Vec<OrderStatus> {
    OrderStatus::ALL
        .iter()
        .copied()
        .filter(|next| current.can_transition_to(*next))
        .collect()
}

/// Fulfillment statuses reachable from `current`, if the order has shipping.
#[must_use]
pub fn next_fulfillment_statuses(current: Option<FulfillmentStatus>) -> Vec<FulfillmentStatus> {
    current.map_or_else(Vec::new, |current| {
        FulfillmentStatus::ALL
            .iter()
            .copied()
            .filter(|next| current.can_transition_to(*next))
            .collect()
    })
}

// =============================================================================
// Pages
// =============================================================================

/// Orders shown on the dashboard.
const RECENT_ORDERS: u32 = 10;

/// `GET /admin`
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> PageResult<DashboardTemplate> {
    let repo = OrderRepository::new(state.pool());
    let metrics = repo.dashboard_metrics().await?;
    let (orders, _) = repo
        .list_for_admin(None, Page::new(None, RECENT_ORDERS))
        .await?;

    Ok(DashboardTemplate {
        user: Some(admin),
        metrics,
        orders,
    })
}

/// `GET /admin/orders`
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(filter): Query<OrderFilter>,
) -> PageResult<OrdersTemplate> {
    let status = parse_filter::<OrderStatus>(&filter.status)?;
    let page = Page::new(filter.page, ADMIN_PAGE_SIZE);
    let (orders, total) = OrderRepository::new(state.pool())
        .list_for_admin(status, page)
        .await?;

    Ok(OrdersTemplate {
        user: Some(admin),
        orders,
        statuses: OrderStatus::ALL,
        status,
        page: page.number,
        total,
        has_previous: page.number > 1,
        has_next: has_next_page(page, total),
    })
}

/// `GET /admin/orders/{id}`
pub async fn order(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Query(query): Query<MessageQuery>,
) -> PageResult<OrderTemplate> {
    let detail = OrderRepository::new(state.pool()).get_detail(id).await?;
    let next_statuses = next_order_statuses(detail.order.status);
    let fulfillment_statuses =
        next_fulfillment_statuses(detail.shipping.as_ref().map(|s| s.status));

    Ok(OrderTemplate {
        user: Some(admin),
        detail,
        next_statuses,
        fulfillment_statuses,
        error: query.error,
        success: query.success,
    })
}

/// `GET /admin/dropship`
pub async fn dropship(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(filter): Query<DropshipFilter>,
    Query(query): Query<MessageQuery>,
) -> PageResult<DropshipTemplate> {
    let status = parse_filter::<DropshipStatus>(&filter.status)?;
    let page = Page::new(filter.page, ADMIN_PAGE_SIZE);
    let orders = DropshipRepository::new(state.pool())
        .list(status, page)
        .await?;
    let has_next = orders.len() >= ADMIN_PAGE_SIZE as usize;

    Ok(DropshipTemplate {
        user: Some(admin),
        orders,
        statuses: DropshipStatus::ALL,
        status,
        page: page.number,
        has_previous: page.number > 1,
        has_next,
        error: query.error,
        success: query.success,
    })
}

// =============================================================================
// Actions
// =============================================================================

fn back(path: &str, result: Result<(), AppError>, success: &str) -> Redirect {
    match result {
        Ok(()) => redirect_with(path, "success", success),
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "Admin action failed");
            }
            redirect_with(path, "error", &e.public_message())
        }
    }
}

/// `POST /admin/orders/{id}/status`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Redirect {
    let result = state
        .orders()
        .update_status(id, form.status)
        .await
        .map(|_| ());
    back(
        &format!("/admin/orders/{id}"),
        result,
        &format!("Order marked {}.", form.status),
    )
}

/// `POST /admin/orders/{id}/fulfillment`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_fulfillment(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Form(form): Form<FulfillmentChange>,
) -> Redirect {
    let update = FulfillmentUpdate::from(form);
    let result = state
        .orders()
        .update_fulfillment(id, &update)
        .await
        .map(|_| ());
    back(&format!("/admin/orders/{id}"), result, "Shipping updated.")
}

/// Where dropship forms return to.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReturnTo {
    pub return_to: String,
}

impl ReturnTo {
    /// A local admin path to go back to, defaulting to the queue.
    #[must_use]
    pub fn path(&self) -> &str {
        let path = self.return_to.trim();
        if path.starts_with("/admin/") && !path.contains("//") {
            path
        } else {
            "/admin/dropship"
        }
    }
}

/// `POST /admin/dropship/{id}/forward`
#[instrument(skip(state, admin, back_to), fields(admin_id = %admin.id))]
pub async fn forward_dropship(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DropshipOrderId>,
    Form(back_to): Form<ReturnTo>,
) -> Redirect {
    let result = state.dropship().forward(id).await.map(|_| ());
    back(back_to.path(), result, "Purchase order sent to supplier.")
}

/// Dropship status form.
#[derive(Debug, Deserialize)]
pub struct DropshipStatusForm {
    pub status: DropshipStatus,
    #[serde(default)]
    pub supplier_reference: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub return_to: String,
}

impl DropshipStatusForm {
    fn split(self) -> (DropshipStatusChange, ReturnTo) {
        (
            DropshipStatusChange {
                status: self.status,
                supplier_reference: self.supplier_reference,
                carrier: self.carrier,
                tracking_number: self.tracking_number,
            },
            ReturnTo {
                return_to: self.return_to,
            },
        )
    }
}

/// `POST /admin/dropship/{id}/status`
#[instrument(skip(state, admin, form), fields(admin_id = %admin.id))]
pub async fn update_dropship_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DropshipOrderId>,
    Form(form): Form<DropshipStatusForm>,
) -> Redirect {
    let (change, back_to) = form.split();
    let result = state.dropship().set_status(id, &change).await.map(|_| ());
    back(
        back_to.path(),
        result,
        &format!("Dropship order marked {}.", change.status),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_next_order_statuses_follow_transitions() {
        assert_eq!(
            next_order_statuses(OrderStatus::Pending),
            vec![OrderStatus::Paid, OrderStatus::Cancelled]
        );
        assert!(next_order_statuses(OrderStatus::Refunded).is_empty());
    }

    #[test]
    fn test_no_fulfillment_choices_without_shipping() {
        assert!(next_fulfillment_statuses(None).is_empty());
        assert!(
            next_fulfillment_statuses(Some(FulfillmentStatus::Unfulfilled))
                .contains(&FulfillmentStatus::Shipped)
        );
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter::<OrderStatus>("").unwrap(), None);
        assert_eq!(
            parse_filter::<OrderStatus>("paid").unwrap(),
            Some(OrderStatus::Paid)
        );
        assert!(parse_filter::<OrderStatus>("lost").is_err());
    }

    #[test]
    fn test_return_to_stays_in_admin() {
        let local = ReturnTo {
            return_to: "/admin/orders/4".to_string(),
        };
        assert_eq!(local.path(), "/admin/orders/4");

        let offsite = ReturnTo {
            return_to: "https://evil.example/admin/".to_string(),
        };
        assert_eq!(offsite.path(), "/admin/dropship");

        let protocol_relative = ReturnTo {
            return_to: "/admin//evil.example".to_string(),
        };
        assert_eq!(protocol_relative.path(), "/admin/dropship");
    }
}

//! The logged-in user's orders and saved addresses.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::instrument;

use nestling_core::{AddressId, OrderId};

use crate::db::{AddressRepository, OrderRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Address, AddressInput, OrderDetail, OrderSummary};
use crate::state::AppState;

/// An order in a list, with its customer-facing number.
#[derive(Serialize)]
pub struct OrderListItem {
    pub number: String,
    #[serde(flatten)]
    pub order: OrderSummary,
}

impl From<OrderSummary> for OrderListItem {
    fn from(order: OrderSummary) -> Self {
        Self {
            number: order.number(),
            order,
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// `GET /api/account/orders`
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderListItem>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(orders.into_iter().map(OrderListItem::from).collect()))
}

/// `GET /api/account/orders/{id}`
pub async fn order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let detail = OrderRepository::new(state.pool())
        .get_detail_for_user(user.id, id)
        .await?;
    Ok(Json(detail))
}

// =============================================================================
// Addresses
// =============================================================================

/// `GET /api/account/addresses`
pub async fn addresses(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Address>>> {
    let addresses = AddressRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(addresses))
}

/// `POST /api/account/addresses`
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn create_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(input): Json<AddressInput>,
) -> Result<impl IntoResponse> {
    let input = input.normalized().map_err(AppError::BadRequest)?;
    let address = AddressRepository::new(state.pool())
        .create(user.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// `PATCH /api/account/addresses/{id}`
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
    Json(input): Json<AddressInput>,
) -> Result<Json<Address>> {
    let input = input.normalized().map_err(AppError::BadRequest)?;
    let address = AddressRepository::new(state.pool())
        .update(user.id, id, &input)
        .await?;
    Ok(Json(address))
}

/// `POST /api/account/addresses/{id}/default`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn set_default_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Json<Address>> {
    let addresses = AddressRepository::new(state.pool());
    addresses.set_default(user.id, id).await?;
    Ok(Json(addresses.get(user.id, id).await?))
}

/// `DELETE /api/account/addresses/{id}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<StatusCode> {
    AddressRepository::new(state.pool())
        .delete(user.id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

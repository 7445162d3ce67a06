//! Cart endpoints for guests and logged-in users.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use nestling_core::CartItemId;

use crate::db::carts::CartOwner;
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::CartView;
use crate::routes::visitor;
use crate::services::cart::AddToCart;
use crate::state::AppState;

/// Body of `PATCH /api/cart/items/{id}`.
#[derive(Debug, Deserialize)]
pub struct QuantityUpdate {
    pub quantity: i32,
}

async fn existing_owner(session: &Session, auth: &OptionalAuth) -> Result<CartOwner> {
    visitor::cart_owner(session, auth.0.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("cart not found".to_string()))
}

/// `GET /api/cart`
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
) -> Result<Json<CartView>> {
    let owner = visitor::cart_owner(&session, auth.0.as_ref()).await?;
    Ok(Json(state.carts().view(owner).await?))
}

/// `POST /api/cart/items`
#[instrument(skip(state, session, auth), fields(variant_id = %item.variant_id))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    Json(item): Json<AddToCart>,
) -> Result<Json<CartView>> {
    let owner = visitor::ensure_cart_owner(&session, auth.0.as_ref()).await?;
    Ok(Json(state.carts().add(owner, item).await?))
}

/// `PATCH /api/cart/items/{id}`
#[instrument(skip(state, session, auth, body))]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    Path(item_id): Path<CartItemId>,
    Json(body): Json<QuantityUpdate>,
) -> Result<Json<CartView>> {
    let owner = existing_owner(&session, &auth).await?;
    Ok(Json(
        state.carts().update(owner, item_id, body.quantity).await?,
    ))
}

/// `DELETE /api/cart/items/{id}`
#[instrument(skip(state, session, auth))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    auth: OptionalAuth,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<CartView>> {
    let owner = existing_owner(&session, &auth).await?;
    Ok(Json(state.carts().remove(owner, item_id).await?))
}

//! Starting a checkout.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use nestling_core::AddressId;

use crate::db::AddressRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{AddressInput, CurrentUser, ShippingAddress};
use crate::routes::visitor;
use crate::services::checkout::{CheckoutRedirect, CheckoutRequest};
use crate::state::AppState;

/// Body of `POST /api/checkout`: a saved address or a new one.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub shipping_address: Option<AddressInput>,
}

/// Resolve where the order ships.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when neither or an invalid address is
/// given, and `AppError::NotFound` for someone else's saved address.
pub async fn shipping_address(
    state: &AppState,
    user: &CurrentUser,
    body: CheckoutBody,
) -> Result<ShippingAddress> {
    match (body.address_id, body.shipping_address) {
        (Some(id), _) => {
            let address = AddressRepository::new(state.pool()).get(user.id, id).await?;
            Ok(ShippingAddress::from(address))
        }
        (None, Some(input)) => Ok(ShippingAddress::from(
            input.normalized().map_err(AppError::BadRequest)?,
        )),
        (None, None) => Err(AppError::BadRequest(
            "a shipping address is required".to_string(),
        )),
    }
}

/// Reserve stock and open a Stripe Checkout Session for the user's cart.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an empty cart or missing address,
/// `AppError::Conflict` when stock ran out, and `AppError::Stripe` when the
/// session cannot be created.
pub async fn start(
    state: &AppState,
    session: &Session,
    user: &CurrentUser,
    body: CheckoutBody,
) -> Result<CheckoutRedirect> {
    let shipping_address = shipping_address(state, user, body).await?;
    let owner = visitor::cart_owner(session, Some(user))
        .await?
        .ok_or_else(|| AppError::BadRequest("cart is empty".to_string()))?;
    let analytics_client_id = visitor::analytics_client_id(session).await?;

    state
        .checkouts()
        .create_checkout(CheckoutRequest {
            owner,
            user_id: Some(user.id),
            email: user.email.clone(),
            shipping_address,
            analytics_client_id: Some(analytics_client_id),
        })
        .await
}

/// `POST /api/checkout`
///
/// Returns the hosted payment page URL for the client to follow.
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse> {
    let redirect = start(&state, &session, &user, body).await?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

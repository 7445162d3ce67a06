//! Return page after Stripe Checkout.
//!
//! The webhook creates the order, so the shopper can land here before it
//! exists. The page then shows a "processing" state instead of an error.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use serde::Deserialize;

use nestling_core::CheckoutStatus;

use crate::db::{CheckoutRepository, OrderRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::routes::PageResult;
use crate::state::AppState;

/// Query Stripe appends to the success URL.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

/// Checkout success page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct SuccessTemplate {
    pub user: Option<CurrentUser>,
    pub order_number: Option<String>,
    pub email: String,
}

/// `GET /checkout/success?session_id=...`
pub async fn success(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<SuccessQuery>,
) -> PageResult<SuccessTemplate> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing checkout session.".to_string()))?;

    let checkout = CheckoutRepository::new(state.pool())
        .get_by_stripe_id(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("We couldn't find that checkout.".to_string()))?;

    let order_number = if checkout.status == CheckoutStatus::Completed {
        OrderRepository::new(state.pool())
            .find_by_checkout_session(checkout.id)
            .await?
            .map(|order| order.number())
    } else {
        None
    };

    Ok(SuccessTemplate {
        user,
        order_number,
        email: checkout.email.into_inner(),
    })
}

//! Stripe webhook receiver.
//!
//! The signature is checked against the raw body before anything is
//! decoded. A 2xx tells Stripe to stop retrying, so only processing failures
//! that a retry could fix answer with 5xx.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::integrations::StripeError;
use crate::integrations::stripe::SIGNATURE_HEADER;
use crate::services::orders::WebhookOutcome;
use crate::state::AppState;

/// Acknowledgement body.
#[derive(Serialize)]
pub struct Received {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

fn rejected(err: StripeError) -> AppError {
    match err {
        StripeError::InvalidSignature(reason) => {
            tracing::warn!(reason, "Rejected webhook with invalid signature");
            AppError::BadRequest("invalid signature".to_string())
        }
        StripeError::Serialization(e) => {
            tracing::warn!(error = %e, "Rejected malformed webhook payload");
            AppError::BadRequest("malformed event".to_string())
        }
        other => AppError::Stripe(other),
    }
}

/// `POST /api/webhooks/stripe`
#[instrument(
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Received>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing signature".to_string()))?;

    let event = state
        .stripe()
        .parse_webhook(&body, signature, Utc::now().timestamp())
        .map_err(rejected)?;

    let span = tracing::Span::current();
    span.record("event_id", event.id.as_str());
    span.record("event_type", event.event_type.as_str());

    let typed = event.into_typed().map_err(rejected)?;
    let outcome = state.orders().handle_webhook(typed).await?;
    tracing::info!(?outcome, "Webhook processed");

    Ok(Json(Received {
        received: true,
        outcome,
    }))
}

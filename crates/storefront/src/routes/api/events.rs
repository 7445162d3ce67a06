//! Analytics collection from the storefront's own pages.
//!
//! Events are forwarded to GA4 in the background under the visitor's
//! session client ID; the response never waits on Google.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::integrations::AnalyticsEvent;
use crate::integrations::analytics::MAX_EVENTS;
use crate::routes::visitor;
use crate::state::AppState;

/// Body of `POST /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventBatch {
    pub events: Vec<AnalyticsEvent>,
}

/// Check a batch before forwarding it.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an empty or oversized batch or an
/// invalid event name.
pub fn validate_batch(batch: &EventBatch) -> Result<()> {
    if batch.events.is_empty() || batch.events.len() > MAX_EVENTS {
        return Err(AppError::BadRequest(format!(
            "send between 1 and {MAX_EVENTS} events"
        )));
    }
    if let Some(event) = batch.events.iter().find(|e| !e.has_valid_name()) {
        return Err(AppError::BadRequest(format!(
            "invalid event name: {}",
            event.name
        )));
    }
    Ok(())
}

/// `POST /api/events`
#[instrument(skip(state, session, batch), fields(count = batch.events.len()))]
pub async fn collect(
    State(state): State<AppState>,
    session: Session,
    Json(batch): Json<EventBatch>,
) -> Result<StatusCode> {
    validate_batch(&batch)?;

    if state.config().analytics.is_enabled() {
        let client_id = visitor::analytics_client_id(&session).await?;
        tokio::spawn(async move {
            if let Err(e) = state.analytics().track(&client_id, &batch.events).await {
                tracing::warn!(error = %e, "Failed to forward analytics events");
            }
        });
    }

    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn batch(names: &[&str]) -> EventBatch {
        EventBatch {
            events: names
                .iter()
                .map(|name| AnalyticsEvent {
                    name: (*name).to_string(),
                    params: serde_json::Map::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_batch() {
        assert!(validate_batch(&batch(&["view_item", "add_to_cart"])).is_ok());
    }

    #[test]
    fn test_empty_and_oversized_batches_rejected() {
        assert!(validate_batch(&batch(&[])).is_err());
        let names = vec!["page_view"; MAX_EVENTS + 1];
        assert!(validate_batch(&batch(&names)).is_err());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = validate_batch(&batch(&["view_item", "9lives"])).unwrap_err();
        assert!(err.to_string().contains("9lives"));
    }
}

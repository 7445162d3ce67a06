//! Server-side analytics via the GA4 Measurement Protocol.
//!
//! Purchases are recorded from the webhook, where the browser is long gone,
//! so they are sent server-to-server against the client ID the storefront
//! assigned to the visitor's session. Page-level events from the storefront's
//! own pages arrive through `POST /api/events` and are forwarded the same way.
//!
//! When no measurement ID or API secret is configured the client is a no-op.

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::AnalyticsConfig;
use crate::models::OrderDetail;

const COLLECT_URL: &str = "https://www.google-analytics.com/mp/collect";

/// Maximum events per Measurement Protocol request.
pub const MAX_EVENTS: usize = 25;

/// Errors from the analytics client.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint returned a non-success status.
    #[error("analytics API error: {0}")]
    Api(u16),

    /// The collect URL could not be built.
    #[error("invalid analytics URL: {0}")]
    Url(#[from] url::ParseError),
}

/// One analytics event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsEvent {
    /// Event name, e.g. `purchase` or `view_item`.
    pub name: String,
    /// Free-form event parameters.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl AnalyticsEvent {
    /// Whether the name is a valid GA4 event name: 1-40 characters of
    /// ASCII letters, digits and underscores, starting with a letter.
    #[must_use]
    pub fn has_valid_name(&self) -> bool {
        let mut chars = self.name.chars();
        self.name.len() <= 40
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// The `purchase` event for an order.
    #[must_use]
    pub fn purchase(detail: &OrderDetail) -> Self {
        let order = &detail.order;
        let items: Vec<Value> = detail
            .items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "item_id": item.sku,
                    "item_name": item.product_name,
                    "item_variant": item.variant_name,
                    "price": decimal_value(item.unit_price),
                    "quantity": item.quantity,
                })
            })
            .collect();

        let mut params = serde_json::Map::new();
        params.insert("transaction_id".into(), Value::from(detail.number.clone()));
        params.insert("currency".into(), Value::from(order.currency.code()));
        params.insert("value".into(), decimal_value(order.total));
        params.insert("shipping".into(), decimal_value(order.shipping));
        params.insert("tax".into(), decimal_value(order.tax));
        params.insert("items".into(), Value::Array(items));

        Self {
            name: "purchase".to_string(),
            params,
        }
    }
}

fn decimal_value(amount: Decimal) -> Value {
    amount
        .to_string()
        .parse::<f64>()
        .map_or(Value::Null, Value::from)
}

#[derive(Debug, Serialize)]
struct CollectBody<'a> {
    client_id: &'a str,
    events: &'a [AnalyticsEvent],
}

#[derive(Clone)]
struct Credentials {
    measurement_id: String,
    api_secret: SecretString,
}

/// GA4 Measurement Protocol client.
#[derive(Clone)]
pub struct AnalyticsClient {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl AnalyticsClient {
    /// Create a new analytics client; disabled unless both the measurement ID
    /// and API secret are configured.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &AnalyticsConfig) -> Result<Self, AnalyticsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let credentials = match (&config.measurement_id, &config.api_secret) {
            (Some(measurement_id), Some(api_secret)) => Some(Credentials {
                measurement_id: measurement_id.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Whether events are actually sent.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send events for a client ID, in requests of at most [`MAX_EVENTS`].
    ///
    /// # Errors
    ///
    /// Returns error if a request fails. A disabled client always succeeds.
    #[instrument(skip(self, events), fields(events = events.len()))]
    pub async fn track(&self, client_id: &str, events: &[AnalyticsEvent]) -> Result<(), AnalyticsError> {
        let Some(credentials) = &self.credentials else {
            tracing::debug!("Analytics disabled, dropping events");
            return Ok(());
        };
        if events.is_empty() {
            return Ok(());
        }

        let url = collect_url(&credentials.measurement_id, credentials.api_secret.expose_secret())?;

        for chunk in events.chunks(MAX_EVENTS) {
            let response = self
                .client
                .post(url.clone())
                .json(&CollectBody {
                    client_id,
                    events: chunk,
                })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(AnalyticsError::Api(status.as_u16()));
            }
        }
        Ok(())
    }
}

fn collect_url(measurement_id: &str, api_secret: &str) -> Result<Url, AnalyticsError> {
    let mut url = Url::parse(COLLECT_URL)?;
    url.query_pairs_mut()
        .append_pair("measurement_id", measurement_id)
        .append_pair("api_secret", api_secret);
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            name: name.to_string(),
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_event_name_validation() {
        assert!(event("view_item").has_valid_name());
        assert!(event("add_to_cart").has_valid_name());
        assert!(!event("").has_valid_name());
        assert!(!event("1st_visit").has_valid_name());
        assert!(!event("view-item").has_valid_name());
        assert!(!event(&"a".repeat(41)).has_valid_name());
    }

    #[test]
    fn test_collect_url() {
        let url = collect_url("G-TEST123", "s3cr3t").unwrap();
        assert_eq!(url.path(), "/mp/collect");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("measurement_id".to_string(), "G-TEST123".to_string()),
                ("api_secret".to_string(), "s3cr3t".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_client_is_noop() {
        let client = AnalyticsClient::new(&AnalyticsConfig::default()).unwrap();
        assert!(!client.is_enabled());
        client.track("123.456", &[event("page_view")]).await.unwrap();
    }
}

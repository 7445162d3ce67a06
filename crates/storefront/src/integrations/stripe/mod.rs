//! Stripe Checkout integration.
//!
//! The storefront only uses hosted Checkout Sessions: it creates one per
//! local checkout session, expires it when the local session is swept or
//! replaced, and learns the outcome from signed webhooks. Requests are
//! form-encoded and authenticated with the secret key as the basic-auth user.

pub mod types;
pub mod webhook;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use nestling_core::{CheckoutSessionId, CurrencyCode, Email, Money, MoneyError};

use crate::config::StripeConfig;
use crate::models::CheckoutItem;

pub use types::{StripeCharge, StripeCheckoutSession, StripePaymentIntent};
pub use webhook::{SIGNATURE_HEADER, StripeEvent, WebhookEvent, verify_signature};

use types::StripeErrorResponse;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Errors from the Stripe integration.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        error_type: String,
        message: String,
        code: Option<String>,
    },

    /// A response or event payload had an unexpected shape.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Webhook signature verification failed.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),

    /// An amount could not be expressed in minor units.
    #[error("invalid amount: {0}")]
    Amount(#[from] MoneyError),
}

/// Everything needed to open a hosted Checkout Session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest<'a> {
    /// Local checkout session ID, sent as metadata.
    pub checkout_session_id: CheckoutSessionId,
    /// Local reference; `client_reference_id` and idempotency key.
    pub reference: Uuid,
    pub email: &'a Email,
    pub currency: CurrencyCode,
    pub items: &'a [CheckoutItem],
    pub shipping: Decimal,
    pub tax: Decimal,
    pub expires_at: DateTime<Utc>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Create a hosted Checkout Session for a local checkout session.
    ///
    /// The local reference doubles as the idempotency key, so a retried
    /// request returns the session created by the first attempt.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest<'_>,
    ) -> Result<StripeCheckoutSession, StripeError> {
        let params = checkout_session_form(request)?;

        let response = self
            .client
            .post(format!("{BASE_URL}/checkout/sessions"))
            .basic_auth(self.secret_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", request.reference.to_string())
            .form(&params)
            .send()
            .await?;

        let session: StripeCheckoutSession = handle_response(response).await?;
        tracing::info!(stripe_session_id = %session.id, "Created Stripe checkout session");
        Ok(session)
    }

    /// Expire an open Checkout Session so it can no longer be paid.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it. Stripe
    /// rejects sessions that are no longer open, whether completed or
    /// already expired.
    #[instrument(skip(self))]
    pub async fn expire_checkout_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<StripeCheckoutSession, StripeError> {
        let response = self
            .client
            .post(format!(
                "{BASE_URL}/checkout/sessions/{stripe_session_id}/expire"
            ))
            .basic_auth(self.secret_key.expose_secret(), Option::<&str>::None)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch a Checkout Session's current state.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it
    /// (`resource_missing` for an unknown session).
    #[instrument(skip(self))]
    pub async fn retrieve_checkout_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<StripeCheckoutSession, StripeError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/checkout/sessions/{stripe_session_id}"))
            .basic_auth(self.secret_key.expose_secret(), Option::<&str>::None)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Verify a webhook delivery and decode its envelope.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignature` for a bad signature and
    /// `StripeError::Serialization` for a malformed body.
    pub fn parse_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent, StripeError> {
        verify_signature(
            self.webhook_secret.expose_secret(),
            payload,
            signature_header,
            now,
        )?;
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Form parameters for `POST /v1/checkout/sessions`.
///
/// Shipping and tax are sent as their own line items so the hosted page
/// shows the same breakdown as the cart.
///
/// # Errors
///
/// Returns `StripeError::Amount` if a price does not fit in minor units.
pub fn checkout_session_form(
    request: &CheckoutSessionRequest<'_>,
) -> Result<Vec<(String, String)>, StripeError> {
    let currency = request.currency.stripe_code();
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("client_reference_id".into(), request.reference.to_string()),
        ("customer_email".into(), request.email.to_string()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("expires_at".into(), request.expires_at.timestamp().to_string()),
        (
            "metadata[checkout_reference]".into(),
            request.reference.to_string(),
        ),
        (
            "metadata[checkout_session_id]".into(),
            request.checkout_session_id.to_string(),
        ),
        (
            "payment_intent_data[metadata][checkout_reference]".into(),
            request.reference.to_string(),
        ),
    ];

    let mut index = 0usize;
    let mut push_line = |params: &mut Vec<(String, String)>,
                         name: String,
                         unit_amount: i64,
                         quantity: i32| {
        let prefix = format!("line_items[{index}]");
        params.push((format!("{prefix}[price_data][currency]"), currency.into()));
        params.push((format!("{prefix}[price_data][product_data][name]"), name));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            unit_amount.to_string(),
        ));
        params.push((format!("{prefix}[quantity]"), quantity.to_string()));
        index += 1;
    };

    for item in request.items {
        let unit = Money::new(item.unit_price, request.currency).to_cents()?;
        let name = if item.variant_name.is_empty() {
            item.product_name.clone()
        } else {
            format!("{} - {}", item.product_name, item.variant_name)
        };
        push_line(&mut params, name, unit, item.quantity);
    }

    if !request.shipping.is_zero() {
        let cents = Money::new(request.shipping, request.currency).to_cents()?;
        push_line(&mut params, "Shipping".into(), cents, 1);
    }

    if !request.tax.is_zero() {
        let cents = Money::new(request.tax, request.currency).to_cents()?;
        push_line(&mut params, "Tax".into(), cents, 1);
    }

    Ok(params)
}

/// Turn a Stripe response into `T` or a typed API error.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StripeError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }

    match serde_json::from_str::<StripeErrorResponse>(&body) {
        Ok(error) => Err(StripeError::Api {
            error_type: error.error.error_type,
            message: error.error.message,
            code: error.error.code,
        }),
        Err(_) => Err(StripeError::Api {
            error_type: "http_error".to_string(),
            message: format!("HTTP {status}"),
            code: None,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use nestling_core::VariantId;

    fn item(name: &str, variant: &str, price: Decimal, quantity: i32) -> CheckoutItem {
        CheckoutItem {
            variant_id: VariantId::new(1),
            product_name: name.to_string(),
            variant_name: variant.to_string(),
            sku: "SKU-1".to_string(),
            unit_price: price,
            quantity,
            registry_item_id: None,
            supplier_id: None,
        }
    }

    fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_checkout_session_form() {
        let email = Email::parse("robin@example.com").unwrap();
        let items = vec![
            item("Swaddle", "Sage", Decimal::new(2499, 2), 2),
            item("Rattle", "", Decimal::new(1000, 2), 1),
        ];
        let reference = Uuid::nil();
        let expires_at = DateTime::from_timestamp(1_760_001_800, 0).unwrap();
        let request = CheckoutSessionRequest {
            checkout_session_id: CheckoutSessionId::new(42),
            reference,
            email: &email,
            currency: CurrencyCode::Usd,
            items: &items,
            shipping: Decimal::new(795, 2),
            tax: Decimal::ZERO,
            expires_at,
            success_url: "https://shop.test/checkout/success".to_string(),
            cancel_url: "https://shop.test/cart".to_string(),
        };

        let params = checkout_session_form(&request).unwrap();

        assert_eq!(get(&params, "mode"), Some("payment"));
        assert_eq!(
            get(&params, "client_reference_id"),
            Some(reference.to_string().as_str())
        );
        assert_eq!(get(&params, "expires_at"), Some("1760001800"));
        assert_eq!(get(&params, "metadata[checkout_session_id]"), Some("42"));

        assert_eq!(
            get(&params, "line_items[0][price_data][product_data][name]"),
            Some("Swaddle - Sage")
        );
        assert_eq!(
            get(&params, "line_items[0][price_data][unit_amount]"),
            Some("2499")
        );
        assert_eq!(get(&params, "line_items[0][quantity]"), Some("2"));
        assert_eq!(
            get(&params, "line_items[1][price_data][product_data][name]"),
            Some("Rattle")
        );
        assert_eq!(
            get(&params, "line_items[2][price_data][product_data][name]"),
            Some("Shipping")
        );
        assert_eq!(
            get(&params, "line_items[2][price_data][unit_amount]"),
            Some("795")
        );
        assert_eq!(get(&params, "line_items[2][price_data][currency]"), Some("usd"));

        // Zero tax is omitted.
        assert_eq!(get(&params, "line_items[3][quantity]"), None);
    }
}

//! Stripe API request and response types.

use serde::Deserialize;

/// A Checkout Session as returned by the Stripe API and inside webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    /// Session ID (`cs_...`).
    pub id: String,
    /// Hosted payment page URL; absent once the session is complete or expired.
    #[serde(default)]
    pub url: Option<String>,
    /// Our checkout reference.
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Payment intent created for the session.
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// `open`, `complete` or `expired`.
    #[serde(default)]
    pub status: Option<String>,
    /// Amount charged in minor units.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Lower-case currency code.
    #[serde(default)]
    pub currency: Option<String>,
}

impl StripeCheckoutSession {
    /// Whether funds have been captured for this session.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid" | "no_payment_required")
        )
    }
}

/// The parts of a payment intent the storefront reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    /// Payment intent ID (`pi_...`).
    pub id: String,
    /// Intent status.
    #[serde(default)]
    pub status: Option<String>,
}

/// The parts of a charge the storefront reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    /// Charge ID (`ch_...`).
    pub id: String,
    /// Payment intent the charge belongs to.
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Whether the whole charge has been refunded.
    #[serde(default)]
    pub refunded: bool,
}

/// Error body returned by the Stripe API.
#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeErrorBody,
}

/// Error details returned by the Stripe API.
#[derive(Debug, Deserialize)]
pub struct StripeErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

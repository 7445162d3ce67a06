//! Webhook signature verification and event decoding.
//!
//! Stripe signs each delivery with a `Stripe-Signature` header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The HMAC-SHA256 is computed
//! with the endpoint secret over `"{t}.{raw body}"`. More than one `v1`
//! appears while a secret is being rolled; any match is accepted.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::StripeError;
use super::types::{StripeCharge, StripeCheckoutSession, StripePaymentIntent};

/// Name of the signature header.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed delivery, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a webhook delivery.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance window, or no `v1` signature matches.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature("missing timestamp"))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature("invalid timestamp"))?;

    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::InvalidSignature("timestamp outside tolerance"));
    }

    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature("no v1 signature"));
    }

    let expected = sign(secret, timestamp, payload)?;

    if signatures
        .iter()
        .any(|sig| constant_time_compare(&expected, sig))
    {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature("signature mismatch"))
    }
}

/// Compute the hex `v1` signature for a timestamp and payload.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the secret cannot key an HMAC.
pub fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> Result<String, StripeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| StripeError::InvalidSignature("invalid secret"))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Event envelope.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    /// Event ID (`evt_...`).
    pub id: String,
    /// Event type, e.g. `checkout.session.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: StripeEventData,
}

/// Event data container.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// The object the event is about.
    pub object: serde_json::Value,
}

/// The events the storefront acts on.
#[derive(Debug)]
pub enum WebhookEvent {
    /// Checkout finished; paid unless payment is asynchronous.
    CheckoutCompleted(StripeCheckoutSession),
    /// An asynchronous payment for a completed checkout cleared.
    CheckoutAsyncPaymentSucceeded(StripeCheckoutSession),
    /// An asynchronous payment for a completed checkout failed.
    CheckoutAsyncPaymentFailed(StripeCheckoutSession),
    /// The session expired unpaid.
    CheckoutExpired(StripeCheckoutSession),
    /// A payment attempt failed.
    PaymentFailed(StripePaymentIntent),
    /// A charge was (partially) refunded.
    ChargeRefunded(StripeCharge),
    /// Anything else; acknowledged and ignored.
    Ignored(String),
}

impl StripeEvent {
    /// Decode the payload of the event types the storefront handles.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Serialization` if a handled event's object does
    /// not have the expected shape.
    pub fn into_typed(self) -> Result<WebhookEvent, StripeError> {
        let object = self.data.object;
        let event = match self.event_type.as_str() {
            "checkout.session.completed" => {
                WebhookEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            "checkout.session.async_payment_succeeded" => {
                WebhookEvent::CheckoutAsyncPaymentSucceeded(serde_json::from_value(object)?)
            }
            "checkout.session.async_payment_failed" => {
                WebhookEvent::CheckoutAsyncPaymentFailed(serde_json::from_value(object)?)
            }
            "checkout.session.expired" => {
                WebhookEvent::CheckoutExpired(serde_json::from_value(object)?)
            }
            "payment_intent.payment_failed" => {
                WebhookEvent::PaymentFailed(serde_json::from_value(object)?)
            }
            "charge.refunded" => WebhookEvent::ChargeRefunded(serde_json::from_value(object)?),
            _ => WebhookEvent::Ignored(self.event_type),
        };
        Ok(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_760_000_000;

    fn header_for(payload: &[u8], ts: i64) -> String {
        let sig = sign(SECRET, &ts.to_string(), payload).unwrap();
        format!("t={ts},v1={sig}")
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = header_for(payload, NOW);
        assert!(verify_signature(SECRET, payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign(SECRET, &NOW.to_string(), payload).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good}");
        assert!(verify_signature(SECRET, payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = header_for(b"original", NOW);
        let result = verify_signature(SECRET, b"tampered", &header, NOW);
        assert!(matches!(result, Err(StripeError::InvalidSignature(_))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let header = header_for(payload, NOW - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(verify_signature(SECRET, payload, &header, NOW).is_err());

        let header = header_for(payload, NOW - SIGNATURE_TOLERANCE_SECS);
        assert!(verify_signature(SECRET, payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        assert!(verify_signature(SECRET, b"{}", "", NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", "v1=abc", NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", &format!("t={NOW}"), NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", "t=soon,v1=abc", NOW).is_err());
    }

    #[test]
    fn test_event_decoding() {
        let event: StripeEvent = serde_json::from_str(
            r#"{
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": {"object": {
                    "id": "cs_test_1",
                    "client_reference_id": "ref",
                    "payment_intent": "pi_1",
                    "payment_status": "paid",
                    "amount_total": 5793
                }}
            }"#,
        )
        .unwrap();

        match event.into_typed().unwrap() {
            WebhookEvent::CheckoutCompleted(session) => {
                assert_eq!(session.id, "cs_test_1");
                assert!(session.is_paid());
                assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unhandled_event_is_ignored() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"id": "evt_2", "type": "customer.created", "data": {"object": {}}}"#,
        )
        .unwrap();
        assert!(matches!(
            event.into_typed().unwrap(),
            WebhookEvent::Ignored(t) if t == "customer.created"
        ));
    }
}

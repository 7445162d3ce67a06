//! Checkout-session creation.
//!
//! Stock for owned-inventory lines is reserved in the transaction that
//! writes the local checkout session. That transaction commits before Stripe
//! is called, so inventory rows are never locked across the HTTP round trip.
//! If Stripe fails, the session is released again. Dropship lines are held by
//! their supplier and reserve nothing locally.
//!
//! A cart has at most one open session. Starting checkout again expires the
//! earlier Stripe session and returns its stock before reserving anew.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use nestling_core::{CartId, CheckoutSessionId, Email, UserId, pricing};

use crate::config::ShopConfig;
use crate::db::carts::{CartOwner, CartRepository};
use crate::db::{CheckoutRepository, RepositoryError, checkout, inventory};
use crate::error::{AppError, Result};
use crate::integrations::StripeClient;
use crate::integrations::stripe::CheckoutSessionRequest;
use crate::models::{CartLine, NewCheckoutSession, ShippingAddress};
use crate::services::cart::unavailable_lines;
use crate::services::orders::{SweepAction, expire_remote, release_session};

/// Shortest hold Stripe accepts for `expires_at`.
pub const MIN_TTL_MINUTES: i64 = 30;

/// Longest hold Stripe accepts for `expires_at`.
pub const MAX_TTL_MINUTES: i64 = 24 * 60;

/// Everything needed to start a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub owner: CartOwner,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub shipping_address: ShippingAddress,
    pub analytics_client_id: Option<String>,
}

/// Where to send the shopper next.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub checkout_session_id: CheckoutSessionId,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    stripe: &'a StripeClient,
    shop: &'a ShopConfig,
    base_url: &'a str,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        stripe: &'a StripeClient,
        shop: &'a ShopConfig,
        base_url: &'a str,
    ) -> Self {
        Self {
            pool,
            stripe,
            shop,
            base_url,
        }
    }

    /// Reserve stock, record a checkout session and open a Stripe Checkout
    /// Session for the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an empty cart, `AppError::Conflict`
    /// if a line is no longer for sale or out of stock or an earlier checkout
    /// of the cart cannot be cancelled, and `AppError::Stripe` if Stripe
    /// rejects the session.
    #[instrument(skip(self, request), fields(user_id = ?request.user_id))]
    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutRedirect> {
        let carts = CartRepository::new(self.pool);
        let cart_id = carts
            .find(request.owner)
            .await?
            .ok_or_else(|| AppError::BadRequest("your cart is empty".to_string()))?;
        let lines = carts.lines(cart_id).await?;
        ensure_checkout_ready(&lines)?;

        let priced: Vec<_> = lines.iter().map(CartLine::priced).collect();
        let totals = pricing::quote(&priced, &self.shop.pricing)?;

        let now = Utc::now();
        let expires_at = now + Duration::minutes(hold_minutes(self.shop.checkout_ttl_minutes));
        let reference = Uuid::new_v4();

        let cancelled = self.cancel_at_stripe(cart_id).await?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        for earlier in checkout::lock_open_for_cart(&mut tx, cart_id).await? {
            if earlier.stripe_session_id.is_some() && !cancelled.contains(&earlier.id) {
                return Err(checkout_in_progress());
            }
            release_session(&mut tx, &earlier).await?;
        }

        for line in lines.iter().filter(|line| line.supplier_id.is_none()) {
            inventory::reserve(&mut tx, line.variant_id, line.quantity)
                .await
                .map_err(|e| match e {
                    RepositoryError::Conflict(_) => AppError::Conflict(format!(
                        "{} ({}) is out of stock",
                        line.product_name, line.variant_name
                    )),
                    other => other.into(),
                })?;
        }

        let session = checkout::insert(
            &mut tx,
            &NewCheckoutSession {
                reference,
                cart_id: Some(cart_id),
                user_id: request.user_id,
                email: request.email,
                totals,
                shipping_address: request.shipping_address,
                analytics_client_id: request.analytics_client_id,
                expires_at,
            },
            &lines,
        )
        .await?;
        let items = checkout::items(&mut tx, session.id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        let stripe_session = match self
            .stripe
            .create_checkout_session(&CheckoutSessionRequest {
                checkout_session_id: session.id,
                reference,
                email: &session.email,
                currency: session.currency,
                items: &items,
                shipping: session.shipping,
                tax: session.tax,
                expires_at,
                success_url: format!(
                    "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.base_url
                ),
                cancel_url: format!("{}/cart", self.base_url),
            })
            .await
        {
            Ok(stripe_session) => stripe_session,
            Err(e) => {
                self.abandon(session.id, None).await;
                return Err(e.into());
            }
        };

        let Some(url) = stripe_session.url.clone() else {
            self.abandon(session.id, Some(&stripe_session.id)).await;
            return Err(AppError::Integration(
                "Stripe returned a checkout session without a URL".to_string(),
            ));
        };

        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        match checkout::attach_stripe_session(&mut conn, session.id, &stripe_session.id, &url)
            .await
        {
            Ok(()) => {}
            Err(RepositoryError::NotFound) => {
                // Released by a checkout started meanwhile from another tab.
                self.abandon(session.id, Some(&stripe_session.id)).await;
                return Err(checkout_in_progress());
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            checkout_session_id = %session.id,
            stripe_session_id = %stripe_session.id,
            total = %totals.total,
            "Checkout session created"
        );

        Ok(CheckoutRedirect {
            checkout_session_id: session.id,
            url,
            expires_at,
        })
    }

    /// Expire the Stripe side of a cart's open sessions.
    ///
    /// Returns the sessions Stripe confirmed can no longer be paid.
    async fn cancel_at_stripe(&self, cart_id: CartId) -> Result<Vec<CheckoutSessionId>> {
        let open = CheckoutRepository::new(self.pool)
            .list_open_for_cart(cart_id)
            .await?;

        let mut cancelled = Vec::with_capacity(open.len());
        for earlier in open {
            if earlier.payment_pending {
                return Err(AppError::Conflict(
                    "a payment for this cart is still being processed".to_string(),
                ));
            }
            let Some(stripe_id) = earlier.stripe_session_id.as_deref() else {
                continue;
            };
            match expire_remote(self.stripe, stripe_id).await {
                SweepAction::Release => cancelled.push(earlier.id),
                SweepAction::AwaitWebhook => {
                    return Err(AppError::Conflict(
                        "this cart has already been paid for".to_string(),
                    ));
                }
                SweepAction::Retry => return Err(checkout_in_progress()),
            }
        }
        Ok(cancelled)
    }

    /// Undo a session whose Stripe side could not be set up.
    ///
    /// Failures are logged; the sweep releases whatever is left.
    async fn abandon(&self, id: CheckoutSessionId, stripe_session_id: Option<&str>) {
        if let Some(stripe_id) = stripe_session_id {
            expire_remote(self.stripe, stripe_id).await;
        }

        let result: Result<()> = async {
            let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
            if let Some(session) = checkout::lock_by_id(&mut tx, id).await? {
                release_session(&mut tx, &session).await?;
            }
            tx.commit().await.map_err(RepositoryError::from)?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(checkout_session_id = %id, error = %e, "Failed to release abandoned checkout");
        }
    }
}

fn checkout_in_progress() -> AppError {
    AppError::Conflict("another checkout for this cart is in progress; try again shortly".to_string())
}

/// Configured hold time, clamped to what Stripe accepts.
#[must_use]
pub fn hold_minutes(configured: i64) -> i64 {
    configured.clamp(MIN_TTL_MINUTES, MAX_TTL_MINUTES)
}

/// Reject carts that cannot be checked out.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an empty cart and `AppError::Conflict`
/// naming the first line that is retired or short on stock.
pub fn ensure_checkout_ready(lines: &[CartLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("your cart is empty".to_string()));
    }
    if let Some(line) = unavailable_lines(lines).first() {
        let reason = if line.purchasable {
            format!("only {} left", line.available.max(0))
        } else {
            "no longer available".to_string()
        };
        return Err(AppError::Conflict(format!(
            "{} ({}) is {reason}",
            line.product_name, line.variant_name
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use nestling_core::{CartId, CartItemId, ProductId, VariantId};

    use super::*;

    fn line(quantity: i32, available: i32) -> CartLine {
        CartLine {
            id: CartItemId::new(1),
            cart_id: CartId::new(1),
            variant_id: VariantId::new(10),
            product_id: ProductId::new(100),
            product_slug: "crib-sheet".to_string(),
            product_name: "Crib Sheet".to_string(),
            variant_name: "Oat".to_string(),
            sku: "CS-OAT".to_string(),
            image_url: None,
            unit_price: Decimal::new(2800, 2),
            quantity,
            registry_item_id: None,
            supplier_id: None,
            purchasable: true,
            available,
        }
    }

    #[test]
    fn test_hold_minutes_clamped() {
        assert_eq!(hold_minutes(5), 30);
        assert_eq!(hold_minutes(45), 45);
        assert_eq!(hold_minutes(10_000), 1440);
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(
            ensure_checkout_ready(&[]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_short_stock_names_line() {
        let err = ensure_checkout_ready(&[line(3, 1)]).unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, "Crib Sheet (Oat) is only 1 left"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_retired_line_rejected() {
        let mut retired = line(1, 10);
        retired.purchasable = false;
        let err = ensure_checkout_ready(&[retired]).unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.ends_with("no longer available")));
    }

    #[test]
    fn test_ready_cart_passes() {
        ensure_checkout_ready(&[line(2, 2)]).unwrap();
    }
}

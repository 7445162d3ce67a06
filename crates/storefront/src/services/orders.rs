//! Payment webhook reconciliation and admin order updates.
//!
//! # Order creation
//!
//! `checkout.session.completed` runs [`OrderService::complete_checkout`] in a
//! single transaction that starts by locking the local checkout session row.
//! A second delivery of the same event blocks on that lock and then sees the
//! session `completed`, so it returns [`Completion::AlreadyProcessed`]
//! without touching anything. The UNIQUE constraint on
//! `orders.checkout_session_id` backs the lock up.
//!
//! Email and analytics run after commit. Their failures are logged and never
//! fail the webhook, since a retry would find the order already created.
//!
//! # Expiry
//!
//! A lapsed hold is only released once Stripe confirms its session can no
//! longer be paid. Stripe refuses to expire a session that is not open, so a
//! refusal is followed by a lookup; see [`sweep_action`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use nestling_core::{
    CheckoutStatus, FulfillmentStatus, Money, OrderId, OrderStatus, PaymentStatus,
};

use crate::db::orders::{self, FulfillmentUpdate};
use crate::db::{
    CheckoutRepository, OrderRepository, RepositoryError, carts, checkout, dropship, inventory,
    registries,
};
use crate::error::{AppError, Result};
use crate::integrations::stripe::{
    StripeCharge, StripeCheckoutSession, StripePaymentIntent, WebhookEvent,
};
use crate::integrations::{AnalyticsClient, AnalyticsEvent, EmailService, StripeClient, StripeError};
use crate::models::{CheckoutItem, CheckoutSession, OrderDetail, Shipping};

/// How many lapsed sessions one sweep handles.
pub const SWEEP_BATCH: i64 = 100;

/// Result of reconciling a completed checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "order_id", rename_all = "snake_case")]
pub enum Completion {
    /// A new order was created.
    Created(OrderId),
    /// The session was already reconciled; nothing changed.
    AlreadyProcessed,
    /// Checkout finished but the payment has not cleared yet.
    AwaitingPayment,
    /// No local session matches the Stripe session.
    UnknownSession,
}

/// Result of handling one webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Completed(Completion),
    Expired(bool),
    PaymentStatusUpdated(bool),
    Ignored,
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub skipped: usize,
}

/// What to do with a lapsed hold, given Stripe's view of its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// The session can no longer be paid; release the stock.
    Release,
    /// The session was paid; the webhook will create the order.
    AwaitWebhook,
    /// Stripe's view is unknown or the session is still open; try later.
    Retry,
}

/// Decide what a lapsed hold needs from Stripe's answer about its session.
#[must_use]
pub fn sweep_action(
    remote: std::result::Result<&StripeCheckoutSession, &StripeError>,
) -> SweepAction {
    match remote {
        Ok(session) => match session.status.as_deref() {
            Some("expired") => SweepAction::Release,
            Some("complete") => SweepAction::AwaitWebhook,
            _ => SweepAction::Retry,
        },
        Err(StripeError::Api {
            code: Some(code), ..
        }) if code == "resource_missing" => SweepAction::Release,
        Err(_) => SweepAction::Retry,
    }
}

/// Expire a Stripe session and report what that means for its local hold.
pub(crate) async fn expire_remote(stripe: &StripeClient, stripe_session_id: &str) -> SweepAction {
    match stripe.expire_checkout_session(stripe_session_id).await {
        Ok(session) => sweep_action(Ok(&session)),
        Err(StripeError::Api { .. }) => {
            let retrieved = stripe.retrieve_checkout_session(stripe_session_id).await;
            if let Err(e) = &retrieved {
                tracing::warn!(stripe_session_id, error = %e, "Could not look up Stripe session");
            }
            sweep_action(retrieved.as_ref())
        }
        Err(e) => {
            tracing::warn!(stripe_session_id, error = %e, "Could not expire Stripe session");
            SweepAction::Retry
        }
    }
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    stripe: &'a StripeClient,
    email: Option<&'a EmailService>,
    analytics: &'a AnalyticsClient,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        stripe: &'a StripeClient,
        email: Option<&'a EmailService>,
        analytics: &'a AnalyticsClient,
    ) -> Self {
        Self {
            pool,
            stripe,
            email,
            analytics,
        }
    }

    /// Apply a verified webhook event.
    ///
    /// # Errors
    ///
    /// Returns error if the database work fails; Stripe retries the delivery.
    #[instrument(skip(self, event))]
    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted(session)
            | WebhookEvent::CheckoutAsyncPaymentSucceeded(session) => self
                .complete_checkout(&session)
                .await
                .map(WebhookOutcome::Completed),
            WebhookEvent::CheckoutAsyncPaymentFailed(session)
            | WebhookEvent::CheckoutExpired(session) => self
                .expire_checkout(&session.id)
                .await
                .map(WebhookOutcome::Expired),
            WebhookEvent::PaymentFailed(intent) => self
                .mark_payment_failed(&intent)
                .await
                .map(WebhookOutcome::PaymentStatusUpdated),
            WebhookEvent::ChargeRefunded(charge) => self
                .mark_refunded(&charge)
                .await
                .map(WebhookOutcome::PaymentStatusUpdated),
            WebhookEvent::Ignored(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Turn a paid Stripe Checkout Session into an order.
    ///
    /// # Errors
    ///
    /// Returns error if any step of the transaction fails; nothing is written.
    #[instrument(skip(self, stripe_session), fields(stripe_session_id = %stripe_session.id))]
    pub async fn complete_checkout(
        &self,
        stripe_session: &StripeCheckoutSession,
    ) -> Result<Completion> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if !stripe_session.is_paid() {
            if let Some(session) =
                checkout::lock_by_stripe_id(&mut tx, &stripe_session.id).await?
            {
                checkout::mark_payment_pending(&mut tx, session.id).await?;
            }
            tx.commit().await.map_err(RepositoryError::from)?;
            tracing::info!("Checkout completed with payment pending");
            return Ok(Completion::AwaitingPayment);
        }

        let Some(session) = checkout::lock_by_stripe_id(&mut tx, &stripe_session.id).await? else {
            tracing::warn!("Webhook for unknown checkout session");
            return Ok(Completion::UnknownSession);
        };

        if session.status == CheckoutStatus::Completed {
            tracing::info!(checkout_session_id = %session.id, "Checkout session already processed");
            return Ok(Completion::AlreadyProcessed);
        }
        let was_expired = session.status == CheckoutStatus::Expired;

        let order = match orders::insert_order(&mut tx, &session, OrderStatus::Paid).await {
            Ok(order) => order,
            Err(RepositoryError::Conflict(_)) => {
                tracing::info!(checkout_session_id = %session.id, "Order already exists");
                return Ok(Completion::AlreadyProcessed);
            }
            Err(e) => return Err(e.into()),
        };

        let items = checkout::items(&mut tx, session.id).await?;
        let mut order_items = Vec::with_capacity(items.len());
        for item in &items {
            order_items.push(orders::insert_item(&mut tx, order.id, item).await?);
        }

        orders::insert_shipping(&mut tx, order.id, &session.shipping_address).await?;

        check_amount(&session, stripe_session);
        orders::insert_payment(
            &mut tx,
            order.id,
            stripe_session.payment_intent.as_deref(),
            PaymentStatus::Succeeded,
            session.total,
            session.currency,
        )
        .await?;

        take_stock(&mut tx, &items, was_expired, order.id).await?;

        for item in &items {
            if let Some(registry_item_id) = item.registry_item_id {
                registries::record_purchase(&mut tx, registry_item_id, item.quantity).await?;
            }
        }

        let dropship_orders = dropship::create_for_order(&mut tx, order.id, &order_items).await?;

        if let Some(cart_id) = session.cart_id {
            carts::clear(&mut tx, cart_id).await?;
        }

        if was_expired {
            checkout::complete_expired(&mut tx, session.id).await?;
        } else {
            checkout::close(&mut tx, session.id, CheckoutStatus::Completed).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            order_id = %order.id,
            checkout_session_id = %session.id,
            items = items.len(),
            dropship_orders = dropship_orders.len(),
            "Order created"
        );

        self.after_order_created(order.id, session.analytics_client_id.as_deref())
            .await;

        Ok(Completion::Created(order.id))
    }

    /// Release an open session's reservations and mark it expired.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns error if the database work fails.
    #[instrument(skip(self))]
    pub async fn expire_checkout(&self, stripe_session_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let Some(session) = checkout::lock_by_stripe_id(&mut tx, stripe_session_id).await? else {
            tracing::warn!("Expiry for unknown checkout session");
            return Ok(false);
        };

        let changed = release_session(&mut tx, &session).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(changed)
    }

    /// Record a failed payment attempt.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    #[instrument(skip(self, intent), fields(payment_intent = %intent.id))]
    pub async fn mark_payment_failed(&self, intent: &StripePaymentIntent) -> Result<bool> {
        let order_id = OrderRepository::new(self.pool)
            .set_payment_status(&intent.id, PaymentStatus::Failed)
            .await?;
        if let Some(order_id) = order_id {
            tracing::warn!(order_id = %order_id, "Payment marked failed");
        }
        Ok(order_id.is_some())
    }

    /// Record a full refund on the payment and its order.
    ///
    /// Partial refunds leave statuses alone.
    ///
    /// # Errors
    ///
    /// Returns error if the database work fails.
    #[instrument(skip(self, charge), fields(charge_id = %charge.id))]
    pub async fn mark_refunded(&self, charge: &StripeCharge) -> Result<bool> {
        let Some(payment_intent) = charge.payment_intent.as_deref() else {
            return Ok(false);
        };
        if !charge.refunded {
            tracing::info!(payment_intent, "Partial refund recorded by Stripe only");
            return Ok(false);
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let Some(order_id) =
            orders::update_payment_status(&mut tx, payment_intent, PaymentStatus::Refunded)
                .await?
        else {
            return Ok(false);
        };

        let order = orders::lock(&mut tx, order_id).await?;
        if order.status.can_transition_to(OrderStatus::Refunded) {
            orders::update_order_status(&mut tx, order_id, order.status, OrderStatus::Refunded)
                .await?;
        } else {
            tracing::warn!(order_id = %order_id, status = %order.status, "Refund on order that cannot be refunded");
        }
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(order_id = %order_id, "Order refunded");
        Ok(true)
    }

    /// Expire open sessions whose hold has lapsed, releasing their stock.
    ///
    /// Each Stripe session is expired first so it can no longer be paid. A
    /// session Stripe reports as complete, or whose state cannot be
    /// confirmed, keeps its hold.
    ///
    /// # Errors
    ///
    /// Returns error if listing sessions fails. Failures on single sessions
    /// are logged and counted as skipped.
    #[instrument(skip(self))]
    pub async fn sweep_expired_sessions(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let lapsed = CheckoutRepository::new(self.pool)
            .list_expired_open(now, SWEEP_BATCH)
            .await?;

        let mut report = SweepReport {
            examined: lapsed.len(),
            ..SweepReport::default()
        };

        for (id, stripe_session_id) in lapsed {
            let action = match stripe_session_id.as_deref() {
                Some(stripe_id) => expire_remote(self.stripe, stripe_id).await,
                None => SweepAction::Release,
            };
            match action {
                SweepAction::Release => {}
                SweepAction::AwaitWebhook => {
                    tracing::info!(checkout_session_id = %id, "Session completed at Stripe, awaiting webhook");
                    report.skipped += 1;
                    continue;
                }
                SweepAction::Retry => {
                    report.skipped += 1;
                    continue;
                }
            }

            let result: Result<bool> = async {
                let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
                let changed = match checkout::lock_by_id(&mut tx, id).await? {
                    Some(session) => release_session(&mut tx, &session).await?,
                    None => false,
                };
                tx.commit().await.map_err(RepositoryError::from)?;
                Ok(changed)
            }
            .await;

            match result {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(checkout_session_id = %id, error = %e, "Failed to expire checkout session");
                    report.skipped += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                "Checkout sweep finished"
            );
        }
        Ok(report)
    }

    /// Move an order to a new status, if the move is allowed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` for a disallowed transition and
    /// `AppError::NotFound` for an unknown order.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, to: OrderStatus) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let order = orders::lock(&mut tx, order_id).await?;
        order.status.ensure_transition(to)?;
        orders::update_order_status(&mut tx, order_id, order.status, to).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(order_id = %order_id, from = %order.status, to = %to, "Order status changed");
        Ok(OrderRepository::new(self.pool).get_detail(order_id).await?)
    }

    /// Record fulfillment progress and keep the order status in step.
    ///
    /// Shipping an order emails the customer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` for a disallowed transition and
    /// `AppError::NotFound` if the order has no shipping row.
    #[instrument(skip(self, update), fields(to = %update.status))]
    pub async fn update_fulfillment(
        &self,
        order_id: OrderId,
        update: &FulfillmentUpdate,
    ) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let shipping = ship(&mut tx, order_id, update).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        let detail = OrderRepository::new(self.pool).get_detail(order_id).await?;
        if update.status == FulfillmentStatus::Shipped {
            notify_shipped(self.email, &detail, &shipping).await;
        }
        Ok(detail)
    }

    async fn after_order_created(&self, order_id: OrderId, analytics_client_id: Option<&str>) {
        let detail = match OrderRepository::new(self.pool).get_detail(order_id).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Could not load order for notifications");
                return;
            }
        };

        if let Some(email) = self.email
            && let Err(e) = email.send_order_confirmation(&detail).await
        {
            tracing::error!(order_id = %order_id, error = %e, "Failed to send order confirmation");
        }

        if let Some(client_id) = analytics_client_id
            && let Err(e) = self
                .analytics
                .track(client_id, &[AnalyticsEvent::purchase(&detail)])
                .await
        {
            tracing::warn!(order_id = %order_id, error = %e, "Failed to record purchase event");
        }
    }
}

/// Apply a fulfillment change inside a transaction, moving the order along
/// with it. Returns the updated shipping row.
///
/// # Errors
///
/// Returns `AppError::Conflict` for a disallowed transition.
pub(crate) async fn ship(
    conn: &mut PgConnection,
    order_id: OrderId,
    update: &FulfillmentUpdate,
) -> Result<Shipping> {
    let order = orders::lock(conn, order_id).await?;
    let current = orders::shipping_status(conn, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} has no shipping record")))?;
    current.ensure_transition(update.status)?;

    let shipping = orders::update_fulfillment(conn, order_id, current, update).await?;

    if let Some(next) = order_status_for(update.status)
        && order.status != next
        && order.status.can_transition_to(next)
    {
        orders::update_order_status(conn, order_id, order.status, next).await?;
    }

    tracing::info!(order_id = %order_id, from = %current, to = %update.status, "Fulfillment updated");
    Ok(shipping)
}

/// Email the customer that an order shipped; failures are logged.
pub(crate) async fn notify_shipped(
    email: Option<&EmailService>,
    detail: &OrderDetail,
    shipping: &Shipping,
) {
    let Some(email) = email else {
        return;
    };
    if let Err(e) = email
        .send_shipping_notification(detail.order.email.as_str(), &detail.number, shipping)
        .await
    {
        tracing::error!(order_id = %detail.order.id, error = %e, "Failed to send shipping notification");
    }
}

/// The order status implied by a fulfillment status, if any.
#[must_use]
pub const fn order_status_for(fulfillment: FulfillmentStatus) -> Option<OrderStatus> {
    match fulfillment {
        FulfillmentStatus::Processing => Some(OrderStatus::Processing),
        FulfillmentStatus::Shipped => Some(OrderStatus::Shipped),
        FulfillmentStatus::Delivered => Some(OrderStatus::Delivered),
        FulfillmentStatus::Unfulfilled | FulfillmentStatus::Returned => None,
    }
}

/// Consume stock for the owned-inventory lines of a new order.
///
/// A live session commits its reservations. A session whose hold already
/// lapsed takes whatever is unreserved; a shortfall is logged as an oversell
/// for the team to resolve, because the customer has already paid.
async fn take_stock(
    conn: &mut PgConnection,
    items: &[CheckoutItem],
    was_expired: bool,
    order_id: OrderId,
) -> Result<()> {
    for item in items.iter().filter(|item| item.supplier_id.is_none()) {
        if !was_expired {
            inventory::commit(conn, item.variant_id, item.quantity).await?;
            continue;
        }
        match inventory::decrement(conn, item.variant_id, item.quantity).await {
            Ok(_) => {}
            Err(RepositoryError::Conflict(_)) => {
                tracing::error!(
                    order_id = %order_id,
                    variant_id = %item.variant_id,
                    quantity = item.quantity,
                    "Late payment oversold variant"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Release an open session's reservations and mark it expired.
pub(crate) async fn release_session(conn: &mut PgConnection, session: &CheckoutSession) -> Result<bool> {
    if session.status != CheckoutStatus::Open {
        return Ok(false);
    }

    let items = checkout::items(conn, session.id).await?;
    for item in items.iter().filter(|item| item.supplier_id.is_none()) {
        inventory::release(conn, item.variant_id, item.quantity).await?;
    }
    checkout::close(conn, session.id, CheckoutStatus::Expired).await?;

    tracing::info!(checkout_session_id = %session.id, "Checkout session expired");
    Ok(true)
}

/// Warn when Stripe charged something other than the frozen total.
fn check_amount(session: &CheckoutSession, stripe_session: &StripeCheckoutSession) {
    let Some(charged) = stripe_session.amount_total else {
        return;
    };
    match Money::new(session.total, session.currency).to_cents() {
        Ok(expected) if expected == charged => {}
        Ok(expected) => tracing::warn!(
            checkout_session_id = %session.id,
            expected,
            charged,
            "Stripe amount differs from checkout total"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not compare Stripe amount"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_follows_fulfillment() {
        assert_eq!(
            order_status_for(FulfillmentStatus::Shipped),
            Some(OrderStatus::Shipped)
        );
        assert_eq!(
            order_status_for(FulfillmentStatus::Delivered),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(order_status_for(FulfillmentStatus::Returned), None);
    }

    fn remote(status: &str) -> StripeCheckoutSession {
        serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "status": status,
            "payment_status": "unpaid",
        }))
        .unwrap()
    }

    fn api_error(code: Option<&str>) -> StripeError {
        StripeError::Api {
            error_type: "invalid_request_error".to_string(),
            message: "This Checkout Session is not open.".to_string(),
            code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_sweep_releases_only_sessions_stripe_expired() {
        assert_eq!(sweep_action(Ok(&remote("expired"))), SweepAction::Release);
        assert_eq!(sweep_action(Ok(&remote("complete"))), SweepAction::AwaitWebhook);
        assert_eq!(sweep_action(Ok(&remote("open"))), SweepAction::Retry);
    }

    #[test]
    fn test_sweep_keeps_hold_when_stripe_refuses_or_fails() {
        // A refused expire on a paid session must never release stock.
        assert_eq!(sweep_action(Err(&api_error(None))), SweepAction::Retry);
        let garbled = StripeError::Serialization(serde_json::from_str::<u8>("<html>").unwrap_err());
        assert_eq!(sweep_action(Err(&garbled)), SweepAction::Retry);
    }

    #[test]
    fn test_sweep_releases_session_unknown_to_stripe() {
        assert_eq!(
            sweep_action(Err(&api_error(Some("resource_missing")))),
            SweepAction::Release
        );
    }

    #[test]
    fn test_completion_serializes_with_order_id() {
        let json = serde_json::to_value(Completion::Created(OrderId::new(42))).unwrap();
        assert_eq!(json["outcome"], "created");
        assert_eq!(json["order_id"], 42);

        let json = serde_json::to_value(Completion::AlreadyProcessed).unwrap();
        assert_eq!(json["outcome"], "already_processed");
    }
}

//! Checkout reconciliation against a real database.
//!
//! Sessions are staged the way `CheckoutService` leaves them once Stripe has
//! answered, then driven through `OrderService` as the webhooks would.
//!
//! These tests require a migrated `PostgreSQL` database
//! (`STOREFRONT_DATABASE_URL`, then `nestling migrate`).
//!
//! Run with: cargo test -p nestling-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use nestling_core::{
    CheckoutSessionId, CheckoutStatus, Email, OrderStatus, PaymentStatus, PricingRules, VariantId,
    pricing,
};
use nestling_integration_tests::{database_pool, test_config, unique_suffix};
use nestling_storefront::db::carts::CartOwner;
use nestling_storefront::db::catalog::{CatalogRepository, ProductUpsert, VariantUpsert};
use nestling_storefront::db::{
    CartRepository, CheckoutRepository, OrderRepository, checkout, inventory,
};
use nestling_storefront::integrations::stripe::{StripeCharge, StripeCheckoutSession};
use nestling_storefront::models::{CartLine, NewCheckoutSession, ShippingAddress};
use nestling_storefront::services::cart::AddToCart;
use nestling_storefront::services::{CartService, Completion};
use nestling_storefront::state::AppState;

const STOCK: i32 = 5;
const ORDERED: i32 = 2;

struct Staged {
    variant_id: VariantId,
    session_id: CheckoutSessionId,
    stripe_session_id: String,
}

async fn seed_variant(pool: &PgPool, suffix: &str) -> VariantId {
    let repo = CatalogRepository::new(pool);
    let product_id = repo
        .upsert_product(&ProductUpsert {
            cms_id: &format!("product-{suffix}"),
            slug: &format!("test-swaddle-{suffix}"),
            name: "Test Swaddle",
            description: "",
            image_url: None,
            category_id: None,
            supplier_id: None,
            is_active: true,
        })
        .await
        .unwrap();
    let variant_id = repo
        .upsert_variant(&VariantUpsert {
            cms_id: &format!("variant-{suffix}"),
            product_id,
            sku: &format!("SW-{suffix}"),
            name: "Muslin",
            price: Decimal::new(2400, 2),
            compare_at_price: None,
            position: 0,
            is_active: true,
        })
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    inventory::adjust(&mut conn, variant_id, STOCK).await.unwrap();
    variant_id
}

/// A guest cart holding [`ORDERED`] units, checked out into an open,
/// reserved session attached to a fresh Stripe session ID.
async fn stage_checkout(pool: &PgPool) -> Staged {
    let suffix = unique_suffix();
    let variant_id = seed_variant(pool, &suffix).await;

    let rules = PricingRules::default();
    let owner = CartOwner::Guest(Uuid::new_v4());
    CartService::new(pool, &rules)
        .add(
            owner,
            AddToCart {
                variant_id,
                quantity: ORDERED,
                registry_item_id: None,
            },
        )
        .await
        .unwrap();
    let carts = CartRepository::new(pool);
    let cart_id = carts.find(owner).await.unwrap().unwrap();
    let lines = carts.lines(cart_id).await.unwrap();
    let priced: Vec<_> = lines.iter().map(CartLine::priced).collect();
    let totals = pricing::quote(&priced, &rules).unwrap();

    let stripe_session_id = format!("cs_test_{suffix}");
    let mut tx = pool.begin().await.unwrap();
    inventory::reserve(&mut tx, variant_id, ORDERED).await.unwrap();
    let session = checkout::insert(
        &mut tx,
        &NewCheckoutSession {
            reference: Uuid::new_v4(),
            cart_id: Some(cart_id),
            user_id: None,
            email: Email::parse(&format!("checkout-{suffix}@example.com")).unwrap(),
            totals,
            shipping_address: ShippingAddress {
                full_name: "Test Parent".to_string(),
                line1: "1 Nursery Lane".to_string(),
                line2: None,
                city: "Portland".to_string(),
                region: "OR".to_string(),
                postal_code: "97201".to_string(),
                country: "US".to_string(),
                phone: None,
            },
            analytics_client_id: None,
            expires_at: Utc::now() + Duration::minutes(30),
        },
        &lines,
    )
    .await
    .unwrap();
    checkout::attach_stripe_session(
        &mut tx,
        session.id,
        &stripe_session_id,
        "https://checkout.stripe.com/c/pay/test",
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    Staged {
        variant_id,
        session_id: session.id,
        stripe_session_id,
    }
}

fn stripe_session(id: &str, payment_status: &str) -> StripeCheckoutSession {
    serde_json::from_value(json!({
        "id": id,
        "status": "complete",
        "payment_status": payment_status,
        "payment_intent": format!("pi_{id}"),
    }))
    .unwrap()
}

async fn order_count(pool: &PgPool, session_id: CheckoutSessionId) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM shop.orders WHERE checkout_session_id = $1")
        .bind(session_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn stock(pool: &PgPool, variant_id: VariantId) -> (i32, i32) {
    let mut conn = pool.acquire().await.unwrap();
    let level = inventory::get_level(&mut conn, variant_id).await.unwrap();
    (level.quantity(), level.reserved())
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_repeated_completion_creates_one_order() {
    let pool = database_pool().await;
    let state = AppState::new(test_config(), pool.clone()).unwrap();
    let staged = stage_checkout(&pool).await;
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK, ORDERED));

    let paid = stripe_session(&staged.stripe_session_id, "paid");
    let first = state.orders().complete_checkout(&paid).await.unwrap();
    assert!(matches!(first, Completion::Created(_)));
    let second = state.orders().complete_checkout(&paid).await.unwrap();
    assert_eq!(second, Completion::AlreadyProcessed);

    assert_eq!(order_count(&pool, staged.session_id).await, 1);
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK - ORDERED, 0));

    let session = CheckoutRepository::new(&pool)
        .get_by_stripe_id(&staged.stripe_session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, CheckoutStatus::Completed);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_payment_after_expiry_still_creates_the_order() {
    let pool = database_pool().await;
    let state = AppState::new(test_config(), pool.clone()).unwrap();
    let staged = stage_checkout(&pool).await;

    assert!(state.orders().expire_checkout(&staged.stripe_session_id).await.unwrap());
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK, 0));
    assert!(!state.orders().expire_checkout(&staged.stripe_session_id).await.unwrap());

    let paid = stripe_session(&staged.stripe_session_id, "paid");
    let completion = state.orders().complete_checkout(&paid).await.unwrap();
    assert!(matches!(completion, Completion::Created(_)));

    assert_eq!(order_count(&pool, staged.session_id).await, 1);
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK - ORDERED, 0));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_unpaid_completion_keeps_hold_out_of_the_sweep() {
    let pool = database_pool().await;
    let state = AppState::new(test_config(), pool.clone()).unwrap();
    let staged = stage_checkout(&pool).await;

    let unpaid = stripe_session(&staged.stripe_session_id, "unpaid");
    let completion = state.orders().complete_checkout(&unpaid).await.unwrap();
    assert_eq!(completion, Completion::AwaitingPayment);
    assert_eq!(order_count(&pool, staged.session_id).await, 0);

    let repo = CheckoutRepository::new(&pool);
    let session = repo
        .get_by_stripe_id(&staged.stripe_session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, CheckoutStatus::Open);
    assert!(session.payment_pending);

    let lapsed = repo
        .list_expired_open(Utc::now() + Duration::days(1), 10_000)
        .await
        .unwrap();
    assert!(lapsed.iter().all(|(id, _)| *id != staged.session_id));
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK, ORDERED));

    let paid = stripe_session(&staged.stripe_session_id, "paid");
    let completion = state.orders().complete_checkout(&paid).await.unwrap();
    assert!(matches!(completion, Completion::Created(_)));
    assert_eq!(stock(&pool, staged.variant_id).await, (STOCK - ORDERED, 0));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_full_refund_moves_payment_and_order_together() {
    let pool = database_pool().await;
    let state = AppState::new(test_config(), pool.clone()).unwrap();
    let staged = stage_checkout(&pool).await;

    let paid = stripe_session(&staged.stripe_session_id, "paid");
    let Completion::Created(order_id) = state.orders().complete_checkout(&paid).await.unwrap()
    else {
        panic!("expected a new order");
    };

    let partial = StripeCharge {
        id: format!("ch_{}", staged.stripe_session_id),
        payment_intent: paid.payment_intent.clone(),
        refunded: false,
    };
    assert!(!state.orders().mark_refunded(&partial).await.unwrap());

    let full = StripeCharge {
        refunded: true,
        ..partial
    };
    assert!(state.orders().mark_refunded(&full).await.unwrap());

    let detail = OrderRepository::new(&pool).get_detail(order_id).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Refunded);
    assert!(
        detail
            .payments
            .iter()
            .all(|payment| payment.status == PaymentStatus::Refunded)
    );
}

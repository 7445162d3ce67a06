//! Cart service against a real database.
//!
//! These tests require a migrated `PostgreSQL` database
//! (`STOREFRONT_DATABASE_URL`, then `nestling migrate`).
//!
//! Run with: cargo test -p nestling-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use nestling_core::{Email, PricingRules, VariantId};
use nestling_integration_tests::{database_pool, unique_suffix};
use nestling_storefront::db::UserRepository;
use nestling_storefront::db::carts::CartOwner;
use nestling_storefront::db::catalog::{CatalogRepository, ProductUpsert, VariantUpsert};
use nestling_storefront::error::AppError;
use nestling_storefront::services::CartService;
use nestling_storefront::services::cart::AddToCart;

async fn seed_variant(pool: &PgPool, price_cents: i64, active: bool) -> VariantId {
    let suffix = unique_suffix();
    let repo = CatalogRepository::new(pool);
    let product_id = repo
        .upsert_product(&ProductUpsert {
            cms_id: &format!("product-{suffix}"),
            slug: &format!("test-onesie-{suffix}"),
            name: "Test Onesie",
            description: "",
            image_url: None,
            category_id: None,
            supplier_id: None,
            is_active: active,
        })
        .await
        .unwrap();
    repo.upsert_variant(&VariantUpsert {
        cms_id: &format!("variant-{suffix}"),
        product_id,
        sku: &format!("TO-{suffix}"),
        name: "0-3 months",
        price: Decimal::new(price_cents, 2),
        compare_at_price: None,
        position: 0,
        is_active: true,
    })
    .await
    .unwrap()
}

const fn add(variant_id: VariantId, quantity: i32) -> AddToCart {
    AddToCart {
        variant_id,
        quantity,
        registry_item_id: None,
    }
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_adding_twice_sums_quantity_and_prices_the_cart() {
    let pool = database_pool().await;
    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let variant_id = seed_variant(&pool, 1800, true).await;
    let owner = CartOwner::Guest(Uuid::new_v4());

    carts.add(owner, add(variant_id, 1)).await.unwrap();
    let view = carts.add(owner, add(variant_id, 2)).await.unwrap();

    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.item_count, 3);
    assert_eq!(view.totals.subtotal.amount, Decimal::new(5400, 2));
    // Below the free shipping threshold
    assert_eq!(view.totals.shipping.amount, rules.flat_shipping);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_inactive_product_cannot_be_added() {
    let pool = database_pool().await;
    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let variant_id = seed_variant(&pool, 1800, false).await;

    let result = carts
        .add(CartOwner::Guest(Uuid::new_v4()), add(variant_id, 1))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_out_of_range_quantity_is_rejected() {
    let pool = database_pool().await;
    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let variant_id = seed_variant(&pool, 1800, true).await;
    let owner = CartOwner::Guest(Uuid::new_v4());

    assert!(matches!(
        carts.add(owner, add(variant_id, 0)).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        carts.add(owner, add(variant_id, 100)).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_guest_cart_merges_into_user_cart_on_login() {
    let pool = database_pool().await;
    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let shared = seed_variant(&pool, 1200, true).await;
    let guest_only = seed_variant(&pool, 900, true).await;

    let email = Email::parse(&format!("merge-{}@example.com", unique_suffix())).unwrap();
    let user = UserRepository::new(&pool)
        .create_with_password(&email, "not-a-real-hash")
        .await
        .unwrap();

    let guest_key = Uuid::new_v4();
    carts.add(CartOwner::User(user.id), add(shared, 2)).await.unwrap();
    carts.add(CartOwner::Guest(guest_key), add(shared, 1)).await.unwrap();
    carts.add(CartOwner::Guest(guest_key), add(guest_only, 1)).await.unwrap();

    carts.merge_on_login(guest_key, user.id).await.unwrap();

    let view = carts.view(Some(CartOwner::User(user.id))).await.unwrap();
    assert_eq!(view.lines.len(), 2);
    assert_eq!(view.item_count, 4);

    let guest = carts.view(Some(CartOwner::Guest(guest_key))).await.unwrap();
    assert!(guest.id.is_none());
    assert!(guest.lines.is_empty());
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_removing_last_line_leaves_empty_totals() {
    let pool = database_pool().await;
    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let variant_id = seed_variant(&pool, 2500, true).await;
    let owner = CartOwner::Guest(Uuid::new_v4());

    let view = carts.add(owner, add(variant_id, 1)).await.unwrap();
    let line_id = view.lines.first().unwrap().id;
    let view = carts.remove(owner, line_id).await.unwrap();

    assert!(view.lines.is_empty());
    assert_eq!(view.totals.total.amount, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_variant_dropped_from_cms_is_no_longer_purchasable() {
    let pool = database_pool().await;
    let suffix = unique_suffix();
    let repo = CatalogRepository::new(&pool);
    let product_cms_id = format!("product-{suffix}");
    let product_id = repo
        .upsert_product(&ProductUpsert {
            cms_id: &product_cms_id,
            slug: &format!("test-sleepsack-{suffix}"),
            name: "Test Sleep Sack",
            description: "",
            image_url: None,
            category_id: None,
            supplier_id: None,
            is_active: true,
        })
        .await
        .unwrap();

    let mut ids = Vec::new();
    for (position, size) in ["small", "large"].into_iter().enumerate() {
        let id = repo
            .upsert_variant(&VariantUpsert {
                cms_id: &format!("{product_cms_id}:{size}"),
                product_id,
                sku: &format!("SS-{size}-{suffix}"),
                name: size,
                price: Decimal::new(3900, 2),
                compare_at_price: None,
                position: i32::try_from(position).unwrap(),
                is_active: true,
            })
            .await
            .unwrap();
        ids.push(id);
    }

    let deactivated = repo
        .deactivate_missing_variants(
            &[product_cms_id.clone()],
            &[format!("{product_cms_id}:small")],
        )
        .await
        .unwrap();
    assert_eq!(deactivated, 1);

    assert!(repo.get_purchasable_variant(ids[0]).await.unwrap().is_some());
    assert!(repo.get_purchasable_variant(ids[1]).await.unwrap().is_none());

    let rules = PricingRules::default();
    let carts = CartService::new(&pool, &rules);
    let result = carts
        .add(CartOwner::Guest(Uuid::new_v4()), add(ids[1], 1))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

//! Stock reservation against a real database.
//!
//! These tests require a migrated `PostgreSQL` database
//! (`STOREFRONT_DATABASE_URL`, then `nestling migrate`).
//!
//! Run with: cargo test -p nestling-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use sqlx::PgPool;

use nestling_core::VariantId;
use nestling_integration_tests::{database_pool, unique_suffix};
use nestling_storefront::db::RepositoryError;
use nestling_storefront::db::catalog::{CatalogRepository, ProductUpsert, VariantUpsert};
use nestling_storefront::db::inventory;

/// Create an active product with one variant and `stock` units on hand.
async fn seed_variant(pool: &PgPool, stock: i32) -> VariantId {
    let suffix = unique_suffix();
    let repo = CatalogRepository::new(pool);
    let product_id = repo
        .upsert_product(&ProductUpsert {
            cms_id: &format!("product-{suffix}"),
            slug: &format!("test-blanket-{suffix}"),
            name: "Test Blanket",
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
            sku: &format!("TB-{suffix}"),
            name: "Default",
            price: Decimal::new(4200, 2),
            compare_at_price: None,
            position: 0,
            is_active: true,
        })
        .await
        .unwrap();

    if stock > 0 {
        let mut conn = pool.acquire().await.unwrap();
        inventory::adjust(&mut conn, variant_id, stock).await.unwrap();
    }
    variant_id
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_synced_variant_starts_with_empty_stock() {
    let pool = database_pool().await;
    let variant_id = seed_variant(&pool, 0).await;

    let mut conn = pool.acquire().await.unwrap();
    let level = inventory::get_level(&mut conn, variant_id).await.unwrap();
    assert_eq!(level.quantity(), 0);
    assert_eq!(level.reserved(), 0);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_reserve_commit_and_release() {
    let pool = database_pool().await;
    let variant_id = seed_variant(&pool, 5).await;
    let mut conn = pool.acquire().await.unwrap();

    let level = inventory::reserve(&mut conn, variant_id, 3).await.unwrap();
    assert_eq!(level.available(), 2);

    let over = inventory::reserve(&mut conn, variant_id, 3).await;
    assert!(matches!(over, Err(RepositoryError::Conflict(_))));

    let level = inventory::release(&mut conn, variant_id, 1).await.unwrap();
    assert_eq!((level.quantity(), level.reserved()), (5, 2));

    let level = inventory::commit(&mut conn, variant_id, 2).await.unwrap();
    assert_eq!((level.quantity(), level.reserved()), (3, 0));
    assert_eq!(level.available(), 3);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_release_more_than_reserved_fails() {
    let pool = database_pool().await;
    let variant_id = seed_variant(&pool, 2).await;
    let mut conn = pool.acquire().await.unwrap();

    inventory::reserve(&mut conn, variant_id, 1).await.unwrap();
    let result = inventory::release(&mut conn, variant_id, 2).await;
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));

    let level = inventory::get_level(&mut conn, variant_id).await.unwrap();
    assert_eq!(level.reserved(), 1);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_write_off_cannot_drop_below_reserved() {
    let pool = database_pool().await;
    let variant_id = seed_variant(&pool, 4).await;
    let mut conn = pool.acquire().await.unwrap();

    inventory::reserve(&mut conn, variant_id, 3).await.unwrap();
    let result = inventory::adjust(&mut conn, variant_id, -2).await;
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));

    let level = inventory::adjust(&mut conn, variant_id, -1).await.unwrap();
    assert_eq!((level.quantity(), level.reserved()), (3, 3));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_concurrent_reservations_never_oversell() {
    let pool = database_pool().await;
    let variant_id = seed_variant(&pool, 3).await;

    let attempts = (0..6).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut conn = pool.acquire().await.unwrap();
            inventory::reserve(&mut conn, variant_id, 1).await.is_ok()
        })
    });
    let mut granted = 0;
    for attempt in attempts {
        if attempt.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 3);
    let mut conn = pool.acquire().await.unwrap();
    let level = inventory::get_level(&mut conn, variant_id).await.unwrap();
    assert_eq!(level.available(), 0);
}

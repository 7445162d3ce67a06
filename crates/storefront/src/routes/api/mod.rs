//! JSON API under `/api`.
//!
//! Errors use the shared `{"error": {"code", "message"}}` body from
//! [`crate::error::AppError`].
//!
//! ```text
//! POST   /api/auth/register | /api/auth/login | /api/auth/logout
//! GET    /api/categories                 GET /api/categories/{slug}
//! GET    /api/products?category=&page=   GET /api/products/{slug}
//! GET    /api/cart                       POST /api/cart/items
//! PATCH  /api/cart/items/{id}            DELETE /api/cart/items/{id}
//! POST   /api/checkout
//! GET    /api/account/orders             GET /api/account/orders/{id}
//! GET    /api/account/addresses          POST /api/account/addresses
//! PATCH  /api/account/addresses/{id}     DELETE /api/account/addresses/{id}
//! POST   /api/account/addresses/{id}/default
//! GET    /api/registries                 POST /api/registries
//! GET    /api/registries/{id}            PATCH /api/registries/{id}
//! POST   /api/registries/{id}/items
//! PATCH  /api/registries/{id}/items/{item_id}
//! DELETE /api/registries/{id}/items/{item_id}
//! GET    /api/registry/share/{code}
//! POST   /api/events
//! POST   /api/webhooks/stripe
//! GET    /api/admin/orders               GET /api/admin/orders/{id}
//! POST   /api/admin/orders/{id}/status   POST /api/admin/orders/{id}/fulfillment
//! GET    /api/admin/dropship             POST /api/admin/dropship/{id}/forward
//! POST   /api/admin/dropship/{id}/status GET /api/admin/suppliers
//! POST   /api/admin/inventory/{variant_id}/adjust
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod events;
pub mod registries;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter, webhook_rate_limiter};
use crate::state::AppState;

fn auth_routes() -> Router<AppState> {
    let router = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));
    match auth_rate_limiter() {
        Some(limiter) => router.layer(limiter),
        None => router,
    }
}

fn webhook_routes() -> Router<AppState> {
    let router = Router::new().route("/stripe", post(webhooks::stripe));
    match webhook_rate_limiter() {
        Some(limiter) => router.layer(limiter),
        None => router,
    }
}

fn shopper_routes() -> Router<AppState> {
    let router = Router::new()
        .route("/cart", get(cart::show))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/checkout", post(checkout::create))
        .route("/account/orders", get(account::orders))
        .route("/account/orders/{id}", get(account::order))
        .route(
            "/account/addresses",
            get(account::addresses).post(account::create_address),
        )
        .route(
            "/account/addresses/{id}",
            patch(account::update_address).delete(account::delete_address),
        )
        .route(
            "/account/addresses/{id}/default",
            post(account::set_default_address),
        )
        .route(
            "/registries",
            get(registries::list).post(registries::create),
        )
        .route(
            "/registries/{id}",
            get(registries::show).patch(registries::update),
        )
        .route("/registries/{id}/items", post(registries::add_item))
        .route(
            "/registries/{id}/items/{item_id}",
            patch(registries::update_item).delete(registries::remove_item),
        )
        .route("/events", post(events::collect));
    match api_rate_limiter() {
        Some(limiter) => router.layer(limiter),
        None => router,
    }
}

fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(catalog::categories))
        .route("/categories/{slug}", get(catalog::category))
        .route("/products", get(catalog::products))
        .route("/products/{slug}", get(catalog::product))
        .route("/registry/share/{code}", get(registries::shared))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::orders))
        .route("/orders/{id}", get(admin::order))
        .route("/orders/{id}/status", post(admin::update_status))
        .route("/orders/{id}/fulfillment", post(admin::update_fulfillment))
        .route("/dropship", get(admin::dropship_orders))
        .route("/dropship/{id}/forward", post(admin::forward_dropship))
        .route("/dropship/{id}/status", post(admin::update_dropship_status))
        .route("/suppliers", get(admin::suppliers))
        .route(
            "/inventory/{variant_id}/adjust",
            post(admin::adjust_inventory),
        )
}

/// All `/api` routes, to be nested under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/webhooks", webhook_routes())
        .nest("/admin", admin_routes())
        .merge(shopper_routes())
        .merge(catalog_routes())
        .fallback(unknown_endpoint)
}

async fn unknown_endpoint() -> AppError {
    AppError::NotFound("no such endpoint".to_string())
}

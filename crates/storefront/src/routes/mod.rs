//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                         - Home page
//! GET  /products/{slug}          - Product page
//! GET  /categories/{slug}        - Category listing
//! GET  /registry/{code}          - Shared registry
//!
//! # Cart (plain HTML forms)
//! GET  /cart                     - Cart page
//! POST /cart/add                 - Add a variant, back to the cart
//! POST /cart/update              - Change a line's quantity
//! POST /cart/remove              - Remove a line
//! POST /cart/checkout            - Start checkout, redirect to Stripe
//! GET  /checkout/success         - Return page after payment
//!
//! # Auth
//! GET  /auth/login               - Login page
//! POST /auth/login               - Login action
//! GET  /auth/register            - Register page
//! POST /auth/register            - Register action
//! POST /auth/logout              - Logout action
//!
//! # Admin (admins only)
//! GET  /admin                    - Dashboard
//! GET  /admin/orders             - Orders
//! GET  /admin/orders/{id}        - Order detail
//! POST /admin/orders/{id}/status, /admin/orders/{id}/fulfillment
//! GET  /admin/dropship           - Dropship queue
//! POST /admin/dropship/{id}/forward, /admin/dropship/{id}/status
//!
//! # JSON API
//! /api/...                       - see [`api`]
//! ```

pub mod admin;
pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod home;
pub mod registry;
pub mod visitor;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};

use crate::db::RepositoryError;
use crate::error::AppError;
use crate::filters;
use crate::models::CurrentUser;
use crate::state::AppState;

// =============================================================================
// Page errors
// =============================================================================

/// Error page template.
#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub user: Option<CurrentUser>,
    pub status: u16,
    pub message: String,
}

/// An error rendered as an HTML page instead of the JSON error body.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<RepositoryError> for PageError {
    fn from(err: RepositoryError) -> Self {
        Self(AppError::from(err))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self.0);
            tracing::error!(error = %self.0, sentry_event_id = %event_id, "Page error");
        }
        let template = ErrorTemplate {
            user: None,
            status: status.as_u16(),
            message: self.0.public_message(),
        };
        (status, template).into_response()
    }
}

/// Result type for page handlers.
pub type PageResult<T> = std::result::Result<T, PageError>;

/// Redirect back to `path` with a message shown by the page.
#[must_use]
pub fn redirect_with(path: &str, key: &str, message: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("{path}?{key}={encoded}"))
}

/// 404 for unknown paths.
pub async fn not_found() -> PageError {
    PageError(AppError::NotFound("page not found".to_string()))
}

// =============================================================================
// Routers
// =============================================================================

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/checkout", post(cart::checkout))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard))
        .route("/orders", get(admin::orders))
        .route("/orders/{id}", get(admin::order))
        .route("/orders/{id}/status", post(admin::update_status))
        .route("/orders/{id}/fulfillment", post(admin::update_fulfillment))
        .route("/dropship", get(admin::dropship))
        .route("/dropship/{id}/forward", post(admin::forward_dropship))
        .route("/dropship/{id}/status", post(admin::update_dropship_status))
}

/// All page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/products/{slug}", get(catalog::product))
        .route("/categories/{slug}", get(catalog::category))
        .route("/registry/{code}", get(registry::show))
        .route("/checkout/success", get(checkout::success))
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
        .nest("/admin", admin_routes())
        .nest("/api", api::routes())
        .fallback(not_found)
}

impl ErrorTemplate {
    /// Status text for the heading.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Error")
    }
}

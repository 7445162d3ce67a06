//! Home page.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;

use nestling_core::CurrencyCode;

use crate::db::Page;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::{Category, CurrentUser, ProductSummary};
use crate::routes::PageResult;
use crate::state::AppState;

/// Products shown on the home page.
const FEATURED_COUNT: u32 = 8;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    pub currency: CurrencyCode,
    pub categories: Vec<Category>,
    pub featured: Vec<ProductSummary>,
}

/// `GET /`
pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> PageResult<HomeTemplate> {
    let categories = state.catalog().categories().await?;
    let listing = state
        .catalog()
        .products(None, Page::new(None, FEATURED_COUNT))
        .await?;

    Ok(HomeTemplate {
        user,
        currency: state.config().shop.pricing.currency,
        categories: categories.as_ref().clone(),
        featured: listing.0.clone(),
    })
}

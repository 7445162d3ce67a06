//! Product and category pages.
//!
//! These responses are publicly cacheable, so they render without the
//! visitor's session.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use nestling_core::CurrencyCode;

use crate::db::Page;
use crate::error::AppError;
use crate::filters;
use crate::models::{Category, CurrentUser, ProductDetail, ProductSummary};
use crate::routes::PageResult;
use crate::state::AppState;

/// Products per category page.
const PER_PAGE: u32 = 24;

/// Query for category pages.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// Product page template.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/product.html")]
pub struct ProductTemplate {
    pub user: Option<CurrentUser>,
    pub currency: CurrencyCode,
    pub product: Arc<ProductDetail>,
}

/// Category page template.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/category.html")]
pub struct CategoryTemplate {
    pub user: Option<CurrentUser>,
    pub currency: CurrencyCode,
    pub category: Category,
    pub products: Vec<ProductSummary>,
    pub page: u32,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Whether there are rows after this page.
#[must_use]
pub fn has_next_page(page: Page, total: i64) -> bool {
    i64::from(page.number) * i64::from(page.size) < total
}

/// `GET /products/{slug}`
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> PageResult<ProductTemplate> {
    let product = state
        .catalog()
        .product(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("We couldn't find that product.".to_string()))?;

    Ok(ProductTemplate {
        user: None,
        currency: state.config().shop.pricing.currency,
        product,
    })
}

/// `GET /categories/{slug}`
pub async fn category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> PageResult<CategoryTemplate> {
    let category = state
        .catalog()
        .category(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("We couldn't find that category.".to_string()))?;

    let page = Page::new(query.page, PER_PAGE);
    let listing = state.catalog().products(Some(category.id), page).await?;
    let (products, total) = listing.as_ref().clone();

    Ok(CategoryTemplate {
        user: None,
        currency: state.config().shop.pricing.currency,
        category,
        products,
        page: page.number,
        has_previous: page.number > 1,
        has_next: has_next_page(page, total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_next_page() {
        assert!(has_next_page(Page::new(Some(1), 24), 25));
        assert!(!has_next_page(Page::new(Some(1), 24), 24));
        assert!(!has_next_page(Page::new(Some(3), 24), 50));
    }
}

//! Public catalog endpoints, served from the catalog cache.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::db::Page;
use crate::error::{AppError, Result};
use crate::models::{Category, ProductDetail, ProductSummary};
use crate::state::AppState;

/// Products per API page.
pub const PRODUCTS_PER_PAGE: u32 = 24;

/// Query for `GET /api/products`.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    /// Category slug.
    pub category: Option<String>,
    pub page: Option<u32>,
}

/// One page of products.
#[derive(Serialize)]
pub struct ProductPage {
    pub products: Vec<ProductSummary>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/// `GET /api/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories = state.catalog().categories().await?;
    Ok(Json(categories.as_ref().clone()))
}

/// `GET /api/categories/{slug}`
pub async fn category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>> {
    let category = state
        .catalog()
        .category(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("category not found".to_string()))?;
    Ok(Json(category))
}

/// `GET /api/products?category=&page=`
pub async fn products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    let category_id = match query.category.as_deref() {
        Some(slug) => Some(
            state
                .catalog()
                .category(slug)
                .await?
                .ok_or_else(|| AppError::NotFound("category not found".to_string()))?
                .id,
        ),
        None => None,
    };

    let page = Page::new(query.page, PRODUCTS_PER_PAGE);
    let listing = state.catalog().products(category_id, page).await?;
    let (products, total) = listing.as_ref().clone();

    Ok(Json(ProductPage {
        products,
        page: page.number,
        per_page: page.size,
        total,
    }))
}

/// `GET /api/products/{slug}`
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let product = state
        .catalog()
        .product(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;
    Ok(Json(Arc::unwrap_or_clone(product)))
}

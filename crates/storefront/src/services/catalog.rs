//! Cached catalog reads.
//!
//! Categories, category pages and product detail are read on nearly every
//! page view and only change when the CMS sync runs, so they sit behind a
//! `moka` cache (5-minute TTL). Stock shown on cached pages can lag by up to
//! the TTL; checkout re-checks availability under a row lock.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::{debug, instrument};

use nestling_core::{CategoryId, InventoryLevel, VariantId};

use crate::db::{CatalogRepository, Page, RepositoryError, inventory};
use crate::models::{Category, ProductDetail, ProductSummary};

/// Time-to-live of cached catalog reads.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Maximum number of cached entries.
pub const CACHE_CAPACITY: u64 = 1_000;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Categories,
    Products {
        category: Option<CategoryId>,
        page: u32,
        size: u32,
    },
    Product(String),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Categories(Arc<Vec<Category>>),
    Products(Arc<(Vec<ProductSummary>, i64)>),
    Product(Option<Arc<ProductDetail>>),
}

/// Read-through cache in front of the catalog repository.
#[derive(Clone)]
pub struct CatalogService {
    pool: PgPool,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    /// Create a catalog service with an empty cache.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self { pool, cache }
    }

    /// All categories in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Arc<Vec<Category>>, RepositoryError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories = Arc::new(CatalogRepository::new(&self.pool).list_categories().await?);
        self.cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(Arc::clone(&categories)),
            )
            .await;
        Ok(categories)
    }

    /// A category by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    pub async fn category(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let categories = self.categories().await?;
        Ok(categories.iter().find(|c| c.slug == slug).cloned())
    }

    /// One page of active products, optionally within a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    #[instrument(skip(self))]
    pub async fn products(
        &self,
        category: Option<CategoryId>,
        page: Page,
    ) -> Result<Arc<(Vec<ProductSummary>, i64)>, RepositoryError> {
        let key = CacheKey::Products {
            category,
            page: page.number,
            size: page.size,
        };
        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(
            CatalogRepository::new(&self.pool)
                .list_products(category, page)
                .await?,
        );
        self.cache
            .insert(key, CacheValue::Products(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// An active product with its variants, by slug.
    ///
    /// Misses are cached too, so unknown slugs do not reach the database on
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    #[instrument(skip(self))]
    pub async fn product(&self, slug: &str) -> Result<Option<Arc<ProductDetail>>, RepositoryError> {
        let key = CacheKey::Product(slug.to_string());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product = CatalogRepository::new(&self.pool)
            .get_product_by_slug(slug)
            .await?
            .filter(|p| p.is_active)
            .map(Arc::new);
        self.cache
            .insert(key, CacheValue::Product(product.clone()))
            .await;
        Ok(product)
    }

    /// Restock or write off units of a variant, then drop cached pages so
    /// the new stock shows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the change would leave fewer
    /// units than are reserved.
    #[instrument(skip(self))]
    pub async fn adjust_inventory(
        &self,
        variant_id: VariantId,
        delta: i32,
    ) -> Result<InventoryLevel, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let level = inventory::adjust(&mut tx, variant_id, delta).await?;
        tx.commit().await?;

        tracing::info!(
            variant_id = %variant_id,
            delta,
            quantity = level.quantity(),
            reserved = level.reserved(),
            "Inventory adjusted"
        );
        self.invalidate_all().await;
        Ok(level)
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn service() -> CatalogService {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        CatalogService::new(pool)
    }

    #[tokio::test]
    async fn test_cached_categories_skip_database() {
        let service = service();
        let categories = Arc::new(vec![Category {
            id: CategoryId::new(1),
            slug: "sleep".to_string(),
            name: "Sleep".to_string(),
            description: None,
            position: 0,
        }]);
        service
            .cache
            .insert(CacheKey::Categories, CacheValue::Categories(categories))
            .await;

        // The pool is never connected; a cache miss would fail here.
        let found = service.category("sleep").await.unwrap();
        assert_eq!(found.unwrap().name, "Sleep");
        assert!(service.category("bath").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_entries() {
        let service = service();
        service
            .cache
            .insert(CacheKey::Product("gone".to_string()), CacheValue::Product(None))
            .await;
        assert!(service.product("gone").await.unwrap().is_none());

        service.invalidate_all().await;
        assert_eq!(service.cache.entry_count(), 0);
    }
}

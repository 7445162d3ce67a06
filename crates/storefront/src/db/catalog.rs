//! Catalog repository.
//!
//! Reads serve the storefront pages and API; the `upsert_*` writes are used
//! by the CMS sync, keyed on the CMS document ID so re-running a sync is
//! idempotent.

use rust_decimal::Decimal;
use sqlx::PgPool;

use nestling_core::{CategoryId, Email, ProductId, SupplierId, VariantId};

use super::{Page, RepositoryError};
use crate::models::{Category, ProductDetail, ProductSummary, SearchRecord, Variant};

const VARIANT_COLUMNS: &str = "v.id, v.product_id, v.sku, v.name, v.price, v.compare_at_price, \
                               v.is_active, COALESCE(i.available, 0) AS available";

/// Catalog category as written by the CMS sync.
#[derive(Debug, Clone)]
pub struct CategoryUpsert<'a> {
    pub cms_id: &'a str,
    pub slug: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub position: i32,
}

/// Supplier as written by the CMS sync.
#[derive(Debug, Clone)]
pub struct SupplierUpsert<'a> {
    pub cms_id: &'a str,
    pub name: &'a str,
    pub email: &'a Email,
    pub lead_time_days: i32,
}

/// Product as written by the CMS sync.
#[derive(Debug, Clone)]
pub struct ProductUpsert<'a> {
    pub cms_id: &'a str,
    pub slug: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub image_url: Option<&'a str>,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
    pub is_active: bool,
}

/// Variant as written by the CMS sync.
#[derive(Debug, Clone)]
pub struct VariantUpsert<'a> {
    pub cms_id: &'a str,
    pub product_id: ProductId,
    pub sku: &'a str,
    pub name: &'a str,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub position: i32,
    pub is_active: bool,
}

/// Repository for catalog reads and CMS sync writes.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All categories in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, slug, name, description, position FROM shop.categories \
             ORDER BY position, name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(categories)
    }

    /// A category by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_category_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, slug, name, description, position FROM shop.categories WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(category)
    }

    /// Active products, optionally restricted to one category, newest first.
    ///
    /// Returns the page of products and the total number of matching products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_products(
        &self,
        category: Option<CategoryId>,
        page: Page,
    ) -> Result<(Vec<ProductSummary>, i64), RepositoryError> {
        let products = sqlx::query_as::<_, ProductSummary>(
            r"
            SELECT p.id, p.slug, p.name, p.image_url, c.slug AS category_slug,
                   MIN(v.price) FILTER (WHERE v.is_active) AS price_from,
                   COALESCE(BOOL_OR(v.is_active AND i.available > 0), FALSE) AS in_stock
            FROM shop.products p
            LEFT JOIN shop.categories c ON c.id = p.category_id
            LEFT JOIN shop.variants v ON v.product_id = p.id
            LEFT JOIN shop.inventory i ON i.variant_id = v.id
            WHERE p.is_active AND ($1::INTEGER IS NULL OR p.category_id = $1)
            GROUP BY p.id, c.slug
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(category)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.products \
             WHERE is_active AND ($1::INTEGER IS NULL OR category_id = $1)",
        )
        .bind(category)
        .fetch_one(self.pool)
        .await?;

        Ok((products, total))
    }

    /// A product by slug with its active variants and their availability.
    ///
    /// Inactive products are returned too; callers decide whether to show them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_product_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        let product = sqlx::query_as::<_, ProductDetail>(
            r"
            SELECT p.id, p.slug, p.name, p.description, p.image_url, p.category_id,
                   c.slug AS category_slug, p.supplier_id, p.is_active
            FROM shop.products p
            LEFT JOIN shop.categories c ON c.id = p.category_id
            WHERE p.slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        let Some(mut product) = product else {
            return Ok(None);
        };

        product.variants = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM shop.variants v \
             LEFT JOIN shop.inventory i ON i.variant_id = v.id \
             WHERE v.product_id = $1 AND v.is_active \
             ORDER BY v.position, v.id"
        ))
        .bind(product.id)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(product))
    }

    /// Variants by ID (active or not), with availability.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_variants(&self, ids: &[VariantId]) -> Result<Vec<Variant>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(VariantId::as_i32).collect();
        let variants = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM shop.variants v \
             LEFT JOIN shop.inventory i ON i.variant_id = v.id \
             WHERE v.id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(self.pool)
        .await?;
        Ok(variants)
    }

    /// One variant, only if it and its product are active.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_purchasable_variant(
        &self,
        id: VariantId,
    ) -> Result<Option<Variant>, RepositoryError> {
        let variant = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM shop.variants v \
             JOIN shop.products p ON p.id = v.product_id \
             LEFT JOIN shop.inventory i ON i.variant_id = v.id \
             WHERE v.id = $1 AND v.is_active AND p.is_active"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(variant)
    }

    /// Insert or update a category by CMS ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another category already uses the slug.
    pub async fn upsert_category(
        &self,
        category: &CategoryUpsert<'_>,
    ) -> Result<CategoryId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO shop.categories (cms_id, slug, name, description, position)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cms_id) DO UPDATE SET
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                position = EXCLUDED.position,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(category.cms_id)
        .bind(category.slug)
        .bind(category.name)
        .bind(category.description)
        .bind(category.position)
        .fetch_one(self.pool)
        .await
        .map_err(|e| super::map_unique_violation(e, "category slug already in use"))
    }

    /// Insert or update a supplier by CMS ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_supplier(
        &self,
        supplier: &SupplierUpsert<'_>,
    ) -> Result<SupplierId, RepositoryError> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO shop.suppliers (cms_id, name, email, lead_time_days)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cms_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                lead_time_days = EXCLUDED.lead_time_days,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(supplier.cms_id)
        .bind(supplier.name)
        .bind(supplier.email)
        .bind(supplier.lead_time_days)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Insert or update a product by CMS ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another product already uses the slug.
    pub async fn upsert_product(
        &self,
        product: &ProductUpsert<'_>,
    ) -> Result<ProductId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO shop.products
                (cms_id, slug, name, description, image_url, category_id, supplier_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cms_id) DO UPDATE SET
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                image_url = EXCLUDED.image_url,
                category_id = EXCLUDED.category_id,
                supplier_id = EXCLUDED.supplier_id,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(product.cms_id)
        .bind(product.slug)
        .bind(product.name)
        .bind(product.description)
        .bind(product.image_url)
        .bind(product.category_id)
        .bind(product.supplier_id)
        .bind(product.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| super::map_unique_violation(e, "product slug already in use"))
    }

    /// Insert or update a variant by CMS ID and make sure it has an inventory row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another variant already uses the SKU.
    pub async fn upsert_variant(
        &self,
        variant: &VariantUpsert<'_>,
    ) -> Result<VariantId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: VariantId = sqlx::query_scalar(
            r"
            INSERT INTO shop.variants
                (cms_id, product_id, sku, name, price, compare_at_price, position, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cms_id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                compare_at_price = EXCLUDED.compare_at_price,
                position = EXCLUDED.position,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(variant.cms_id)
        .bind(variant.product_id)
        .bind(variant.sku)
        .bind(variant.name)
        .bind(variant.price)
        .bind(variant.compare_at_price)
        .bind(variant.position)
        .bind(variant.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| super::map_unique_violation(e, "variant SKU already in use"))?;

        super::inventory::ensure_row(&mut tx, id).await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Deactivate products (and their variants) whose CMS IDs are not in `keep`.
    ///
    /// Returns the number of products deactivated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn deactivate_missing_products(&self, keep: &[String]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE shop.products SET is_active = FALSE, updated_at = now() \
             WHERE is_active AND NOT (cms_id = ANY($1))",
        )
        .bind(keep)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE shop.variants v SET is_active = FALSE, updated_at = now() \
             FROM shop.products p \
             WHERE p.id = v.product_id AND NOT p.is_active AND v.is_active",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Deactivate variants of `products` whose CMS IDs are not in `keep`.
    ///
    /// Catches variants dropped from a product that is still in the CMS;
    /// variants of missing products go with [`Self::deactivate_missing_products`].
    /// Returns the number of variants deactivated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn deactivate_missing_variants(
        &self,
        products: &[String],
        keep: &[String],
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.variants SET is_active = FALSE, updated_at = now() \
             WHERE is_active AND NOT (cms_id = ANY($2)) \
               AND product_id IN (SELECT id FROM shop.products WHERE cms_id = ANY($1))",
        )
        .bind(products)
        .bind(keep)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Every product flattened for the search index, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_search_records(&self) -> Result<Vec<SearchRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, SearchRecord>(
            r"
            SELECT p.slug AS object_id, p.name, p.description, c.name AS category,
                   p.image_url,
                   MIN(v.price) FILTER (WHERE v.is_active) AS price_from,
                   COALESCE(ARRAY_AGG(v.sku) FILTER (WHERE v.is_active), '{}') AS skus,
                   COALESCE(BOOL_OR(v.is_active AND i.available > 0), FALSE) AS in_stock,
                   p.is_active
            FROM shop.products p
            LEFT JOIN shop.categories c ON c.id = p.category_id
            LEFT JOIN shop.variants v ON v.product_id = p.id
            LEFT JOIN shop.inventory i ON i.variant_id = v.id
            GROUP BY p.id, c.name
            ORDER BY p.id
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }
}

//! CMS to database catalog sync, and the search reindex that follows it.
//!
//! Categories are written first so products can point at them, then each
//! product with its supplier and variants. Products and variants missing
//! from the CMS are deactivated rather than deleted; order history still
//! references them.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use nestling_core::{CategoryId, Email, SupplierId};

use crate::db::RepositoryError;
use crate::db::catalog::{
    CatalogRepository, CategoryUpsert, ProductUpsert, SupplierUpsert, VariantUpsert,
};
use crate::integrations::cms::{CmsCategory, CmsProduct};
use crate::integrations::search::IndexReport;
use crate::integrations::{CmsClient, CmsError, SearchClient, SearchError};

/// Errors that stop a sync or reindex.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cms(#[from] CmsError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub categories: usize,
    pub suppliers: usize,
    pub products: usize,
    pub variants: usize,
    pub skipped: usize,
    pub deactivated: u64,
    pub deactivated_variants: u64,
}

/// Why a product document cannot be written.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn check_product(product: &CmsProduct) -> Result<(), String> {
    if product.slug.trim().is_empty() {
        return Err("missing slug".to_string());
    }
    if product.title.trim().is_empty() {
        return Err("missing title".to_string());
    }
    let mut skus = HashSet::new();
    for variant in &product.variants {
        if variant.sku.trim().is_empty() {
            return Err(format!("variant {} has no SKU", variant.key));
        }
        if variant.price.is_sign_negative() {
            return Err(format!("variant {} has a negative price", variant.sku));
        }
        if !skus.insert(variant.sku.as_str()) {
            return Err(format!("duplicate SKU {}", variant.sku));
        }
    }
    Ok(())
}

/// Pulls the catalog from the CMS into the database.
pub struct CatalogSync<'a> {
    pool: &'a PgPool,
    cms: &'a CmsClient,
}

impl<'a> CatalogSync<'a> {
    /// Create a sync over a pool and CMS client.
    #[must_use]
    pub const fn new(pool: &'a PgPool, cms: &'a CmsClient) -> Self {
        Self { pool, cms }
    }

    /// Run a full sync.
    ///
    /// Invalid product documents are logged and skipped; the rest of the
    /// catalog still syncs.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the CMS cannot be read or a write fails.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let categories = self.cms.categories().await?;
        let products = self.cms.products().await?;
        tracing::info!(
            categories = categories.len(),
            products = products.len(),
            "Fetched catalog from CMS"
        );

        let repo = CatalogRepository::new(self.pool);
        let mut report = SyncReport::default();

        let category_ids = self.sync_categories(&repo, &categories).await?;
        report.categories = category_ids.len();

        let mut supplier_ids: HashMap<String, SupplierId> = HashMap::new();
        let mut seen = Vec::with_capacity(products.len());
        let mut seen_variants = Vec::new();

        for product in &products {
            if let Err(reason) = check_product(product) {
                tracing::warn!(cms_id = %product.id, %reason, "Skipping product");
                report.skipped += 1;
                continue;
            }

            let supplier_id = match &product.supplier {
                Some(supplier) => {
                    if let Some(id) = supplier_ids.get(&supplier.id) {
                        Some(*id)
                    } else {
                        let Ok(email) = Email::parse(&supplier.email) else {
                            tracing::warn!(
                                cms_id = %product.id,
                                supplier = %supplier.id,
                                "Skipping product with invalid supplier email"
                            );
                            report.skipped += 1;
                            continue;
                        };
                        let id = repo
                            .upsert_supplier(&SupplierUpsert {
                                cms_id: &supplier.id,
                                name: &supplier.name,
                                email: &email,
                                lead_time_days: supplier.lead_time_days,
                            })
                            .await?;
                        supplier_ids.insert(supplier.id.clone(), id);
                        Some(id)
                    }
                }
                None => None,
            };

            let category_id = product
                .category_id
                .as_ref()
                .and_then(|cms_id| category_ids.get(cms_id).copied());
            if product.category_id.is_some() && category_id.is_none() {
                tracing::warn!(cms_id = %product.id, "Product references an unknown category");
            }

            let product_id = repo
                .upsert_product(&ProductUpsert {
                    cms_id: &product.id,
                    slug: product.slug.trim(),
                    name: product.title.trim(),
                    description: product.description.as_deref().unwrap_or_default(),
                    image_url: product.image_url.as_deref(),
                    category_id,
                    supplier_id,
                    is_active: product.active,
                })
                .await?;

            for (position, variant) in product.variants.iter().enumerate() {
                let cms_id = product.variant_cms_id(variant);
                repo.upsert_variant(&VariantUpsert {
                    cms_id: &cms_id,
                    product_id,
                    sku: variant.sku.trim(),
                    name: variant.title.trim(),
                    price: variant.price,
                    compare_at_price: variant.compare_at_price,
                    position: i32::try_from(position).unwrap_or(i32::MAX),
                    is_active: variant.active,
                })
                .await?;
                seen_variants.push(cms_id);
                report.variants += 1;
            }

            seen.push(product.id.clone());
            report.products += 1;
        }

        report.suppliers = supplier_ids.len();
        report.deactivated = repo.deactivate_missing_products(&seen).await?;
        report.deactivated_variants = repo.deactivate_missing_variants(&seen, &seen_variants).await?;

        tracing::info!(
            categories = report.categories,
            products = report.products,
            variants = report.variants,
            skipped = report.skipped,
            deactivated = report.deactivated,
            deactivated_variants = report.deactivated_variants,
            "Catalog sync complete"
        );
        Ok(report)
    }

    async fn sync_categories(
        &self,
        repo: &CatalogRepository<'_>,
        categories: &[CmsCategory],
    ) -> Result<HashMap<String, CategoryId>, SyncError> {
        let mut ids = HashMap::with_capacity(categories.len());
        for category in categories {
            let id = repo
                .upsert_category(&CategoryUpsert {
                    cms_id: &category.id,
                    slug: category.slug.trim(),
                    name: category.title.trim(),
                    description: category.description.as_deref(),
                    position: category.position,
                })
                .await?;
            ids.insert(category.id.clone(), id);
        }
        Ok(ids)
    }
}

/// Push every product to the search index.
///
/// # Errors
///
/// Returns `SyncError` if the products cannot be read or a batch fails.
#[instrument(skip(pool, search))]
pub async fn reindex(pool: &PgPool, search: &SearchClient) -> Result<IndexReport, SyncError> {
    let records = CatalogRepository::new(pool).list_search_records().await?;
    let report = search.index_records(&records).await?;
    tracing::info!(
        updated = report.updated,
        deleted = report.deleted,
        batches = report.batches,
        "Search reindex complete"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::integrations::cms::CmsVariant;

    fn variant(key: &str, sku: &str, price: i64) -> CmsVariant {
        CmsVariant {
            key: key.to_string(),
            sku: sku.to_string(),
            title: "Default".to_string(),
            price: Decimal::new(price, 2),
            compare_at_price: None,
            active: true,
        }
    }

    fn product(variants: Vec<CmsVariant>) -> CmsProduct {
        CmsProduct {
            id: "product-1".to_string(),
            slug: "linen-swaddle".to_string(),
            title: "Linen Swaddle".to_string(),
            description: None,
            active: true,
            image_url: None,
            category_id: None,
            supplier: None,
            variants,
        }
    }

    #[test]
    fn test_valid_product_passes() {
        let p = product(vec![variant("a", "SW-1", 2400), variant("b", "SW-2", 2400)]);
        assert!(check_product(&p).is_ok());
    }

    #[test]
    fn test_duplicate_sku_rejected() {
        let p = product(vec![variant("a", "SW-1", 2400), variant("b", "SW-1", 2600)]);
        assert_eq!(check_product(&p).unwrap_err(), "duplicate SKU SW-1");
    }

    #[test]
    fn test_missing_slug_and_negative_price_rejected() {
        let mut p = product(vec![variant("a", "SW-1", 2400)]);
        p.slug = "  ".to_string();
        assert!(check_product(&p).is_err());

        let p = product(vec![variant("a", "SW-1", -100)]);
        assert!(check_product(&p).is_err());
    }
}

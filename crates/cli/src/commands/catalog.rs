//! Catalog commands: CMS sync and search reindex.
//!
//! # Usage
//!
//! ```bash
//! nestling sync-cms            # CMS -> database
//! nestling sync-cms --reindex  # CMS -> database -> search index
//! nestling reindex             # database -> search index
//! ```

use thiserror::Error;

use nestling_storefront::integrations::{CmsClient, CmsError, SearchClient, SearchError};
use nestling_storefront::services::catalog_sync::{self, CatalogSync, SyncError};

use super::{SetupError, connect};

/// Errors that can occur during catalog commands.
#[derive(Debug, Error)]
pub enum CatalogCommandError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("CMS client: {0}")]
    Cms(#[from] CmsError),

    #[error("Search client: {0}")]
    Search(#[from] SearchError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Search is not configured (set ALGOLIA_APP_ID, ALGOLIA_ADMIN_KEY, ALGOLIA_INDEX)")]
    SearchNotConfigured,
}

/// Pull the catalog from the CMS, optionally refreshing search afterwards.
///
/// # Errors
///
/// Returns `CatalogCommandError` if setup, the sync or the reindex fails.
pub async fn sync(then_reindex: bool) -> Result<(), CatalogCommandError> {
    let (config, pool) = connect().await?;
    let cms = CmsClient::new(&config.cms)?;

    let report = CatalogSync::new(&pool, &cms).run().await?;
    tracing::info!("Categories: {}", report.categories);
    tracing::info!("Suppliers:  {}", report.suppliers);
    tracing::info!("Products:   {}", report.products);
    tracing::info!("Variants:   {}", report.variants);
    tracing::info!("Skipped:    {}", report.skipped);
    tracing::info!("Deactivated: {} products, {} variants", report.deactivated, report.deactivated_variants);

    if then_reindex {
        match &config.search {
            Some(search) => {
                let client = SearchClient::new(search)?;
                catalog_sync::reindex(&pool, &client).await?;
            }
            None => tracing::warn!("Search is not configured, skipping reindex"),
        }
    }

    Ok(())
}

/// Push every product to the search index.
///
/// # Errors
///
/// Returns `CatalogCommandError` if search is not configured or indexing fails.
pub async fn reindex() -> Result<(), CatalogCommandError> {
    let (config, pool) = connect().await?;
    let search = config
        .search
        .as_ref()
        .ok_or(CatalogCommandError::SearchNotConfigured)?;
    let client = SearchClient::new(search)?;

    let report = catalog_sync::reindex(&pool, &client).await?;
    tracing::info!(
        "Indexed {} products, removed {} ({} batches)",
        report.updated,
        report.deleted,
        report.batches
    );
    Ok(())
}

//! Command implementations.

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod migrate;

use nestling_storefront::config::{ConfigError, StorefrontConfig};
use nestling_storefront::db;

/// Errors shared by commands that need the full storefront configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Load the storefront configuration and connect to its database.
async fn connect() -> Result<(StorefrontConfig, sqlx::PgPool), SetupError> {
    let config = StorefrontConfig::from_env()?;

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&config.database_url).await?;

    Ok((config, pool))
}

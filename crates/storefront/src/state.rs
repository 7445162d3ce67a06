//! Application state shared across handlers.

use std::sync::Arc;

use lettre::transport::smtp::Error as SmtpError;
use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::integrations::{AnalyticsClient, AnalyticsError, EmailService, StripeClient, StripeError};
use crate::services::{
    CartService, CatalogService, CheckoutService, DropshipService, OrderService, RegistryService,
};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("stripe client: {0}")]
    Stripe(#[from] StripeError),
    #[error("email transport: {0}")]
    Email(#[from] SmtpError),
    #[error("analytics client: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    stripe: StripeClient,
    email: Option<EmailService>,
    analytics: AnalyticsClient,
    catalog: CatalogService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if an integration client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let stripe = StripeClient::new(&config.stripe)?;
        let email = config
            .email
            .as_ref()
            .map(|email| EmailService::new(email, &config.base_url))
            .transpose()?;
        if email.is_none() {
            tracing::warn!("SMTP not configured, transactional email disabled");
        }
        let analytics = AnalyticsClient::new(&config.analytics)?;
        let catalog = CatalogService::new(pool.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stripe,
                email,
                analytics,
                catalog,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Stripe client.
    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    /// Get the email service, if SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// Get a reference to the analytics client.
    #[must_use]
    pub fn analytics(&self) -> &AnalyticsClient {
        &self.inner.analytics
    }

    /// Get the cached catalog.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Cart service for this request.
    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.pool(), &self.inner.config.shop.pricing)
    }

    /// Checkout service for this request.
    #[must_use]
    pub fn checkouts(&self) -> CheckoutService<'_> {
        let config = self.config();
        CheckoutService::new(self.pool(), self.stripe(), &config.shop, &config.base_url)
    }

    /// Order service for this request.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.pool(), self.stripe(), self.email(), self.analytics())
    }

    /// Registry service for this request.
    #[must_use]
    pub fn registries(&self) -> RegistryService<'_> {
        RegistryService::new(self.pool())
    }

    /// Dropship service for this request.
    #[must_use]
    pub fn dropship(&self) -> DropshipService<'_> {
        DropshipService::new(self.pool(), self.email())
    }
}

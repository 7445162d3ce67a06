//! Headless CMS client.
//!
//! The catalog is authored in a Sanity-style content lake and pulled with
//! GROQ queries over HTTP:
//!
//! ```text
//! GET https://{project}.api.sanity.io/v{version}/data/query/{dataset}?query=...
//! ```
//!
//! Only the CLI sync talks to the CMS; the storefront serves everything from
//! the database afterwards.

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::CmsConfig;

const CATEGORIES_QUERY: &str = r#"*[_type == "category"] | order(position asc) {
  _id, "slug": slug.current, title, description, position
}"#;

const PRODUCTS_QUERY: &str = r#"*[_type == "product" && !(_id in path("drafts.**"))] {
  _id, "slug": slug.current, title, description, active,
  "imageUrl": mainImage.asset->url,
  "categoryId": category._ref,
  "supplier": supplier->{ _id, name, email, leadTimeDays },
  variants[] { _key, sku, title, price, compareAtPrice, active }
}"#;

/// Errors from the CMS client.
#[derive(Debug, Error)]
pub enum CmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The CMS returned a non-success status.
    #[error("CMS API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The query URL could not be built.
    #[error("invalid CMS URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Query response envelope.
#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

/// A category document.
#[derive(Debug, Clone, Deserialize)]
pub struct CmsCategory {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: i32,
}

/// A supplier referenced by a dropship product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsSupplier {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default = "default_lead_time")]
    pub lead_time_days: i32,
}

const fn default_lead_time() -> i32 {
    3
}

/// A product variant, embedded in its product document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsVariant {
    #[serde(rename = "_key")]
    pub key: String,
    pub sku: String,
    pub title: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub compare_at_price: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A product document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsProduct {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub supplier: Option<CmsSupplier>,
    #[serde(default)]
    pub variants: Vec<CmsVariant>,
}

impl CmsProduct {
    /// CMS ID of a variant, unique across the dataset.
    #[must_use]
    pub fn variant_cms_id(&self, variant: &CmsVariant) -> String {
        format!("{}:{}", self.id, variant.key)
    }
}

const fn default_active() -> bool {
    true
}

/// Read-only CMS client.
#[derive(Clone)]
pub struct CmsClient {
    client: reqwest::Client,
    config: CmsConfig,
}

impl CmsClient {
    /// Create a new CMS client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CmsConfig) -> Result<Self, CmsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// All categories, in display order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<CmsCategory>, CmsError> {
        self.query(CATEGORIES_QUERY).await
    }

    /// All published products with their variants and suppliers.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Vec<CmsProduct>, CmsError> {
        self.query(PRODUCTS_QUERY).await
    }

    async fn query<T: DeserializeOwned>(&self, groq: &str) -> Result<T, CmsError> {
        let url = query_url(&self.config, groq)?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CmsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: QueryResponse<T> = response.json().await?;
        Ok(body.result)
    }
}

/// Build the query URL for a GROQ query.
///
/// # Errors
///
/// Returns error if the project ID produces an invalid host.
pub fn query_url(config: &CmsConfig, groq: &str) -> Result<Url, CmsError> {
    let mut url = Url::parse(&format!(
        "https://{}.api.sanity.io/v{}/data/query/{}",
        config.project_id, config.api_version, config.dataset
    ))?;
    url.query_pairs_mut().append_pair("query", groq);
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> CmsConfig {
        CmsConfig {
            project_id: "abc123".to_string(),
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: None,
        }
    }

    #[test]
    fn test_query_url() {
        let url = query_url(&config(), "*[_type == \"category\"]").unwrap();
        assert_eq!(url.host_str(), Some("abc123.api.sanity.io"));
        assert_eq!(url.path(), "/v2024-01-01/data/query/production");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "query");
        assert_eq!(value, "*[_type == \"category\"]");
    }

    #[test]
    fn test_product_document() {
        let body = r#"{"result": [{
            "_id": "product-1",
            "slug": "muslin-swaddle",
            "title": "Muslin Swaddle",
            "imageUrl": "https://cdn.test/swaddle.jpg",
            "categoryId": "category-1",
            "supplier": {"_id": "supplier-1", "name": "Loom Co", "email": "orders@loom.test"},
            "variants": [
                {"_key": "k1", "sku": "SW-SAGE", "title": "Sage", "price": 24.99},
                {"_key": "k2", "sku": "SW-OAT", "title": "Oat", "price": 24.99,
                 "compareAtPrice": 29.99, "active": false}
            ]
        }]}"#;

        let parsed: QueryResponse<Vec<CmsProduct>> = serde_json::from_str(body).unwrap();
        let product = &parsed.result[0];

        assert!(product.active);
        assert_eq!(product.supplier.as_ref().unwrap().lead_time_days, 3);
        assert_eq!(product.variants[0].price, Decimal::new(2499, 2));
        assert!(!product.variants[1].active);
        assert_eq!(product.variants[1].compare_at_price, Some(Decimal::new(2999, 2)));
        assert_eq!(product.variant_cms_id(&product.variants[0]), "product-1:k1");
    }
}

//! Search index uploads.
//!
//! Product records are pushed to a hosted Algolia index with the batch API.
//! Active products are sent as `updateObject`, inactive ones as
//! `deleteObject`, so a full reindex also removes products that left the
//! catalog. Querying happens client-side against Algolia directly.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::SearchConfig;
use crate::models::SearchRecord;

/// Maximum operations per batch request.
pub const BATCH_SIZE: usize = 1_000;

/// Errors from the search client.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Algolia returned a non-success status.
    #[error("search API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// One operation of a batch request.
#[derive(Debug, Serialize)]
#[serde(tag = "action", content = "body", rename_all = "camelCase")]
pub enum BatchOperation<'a> {
    UpdateObject(&'a SearchRecord),
    DeleteObject(DeleteBody<'a>),
}

/// Body of a `deleteObject` operation.
#[derive(Debug, Serialize)]
pub struct DeleteBody<'a> {
    #[serde(rename = "objectID")]
    pub object_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a, 'r> {
    requests: &'a [BatchOperation<'r>],
}

/// Outcome of a reindex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub updated: usize,
    pub deleted: usize,
    pub batches: usize,
}

/// Algolia indexing client.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    app_id: String,
    admin_key: SecretString,
    index_name: String,
}

impl SearchClient {
    /// Create a new search client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            app_id: config.app_id.clone(),
            admin_key: config.admin_key.clone(),
            index_name: config.index_name.clone(),
        })
    }

    /// Push every record to the index in batches of [`BATCH_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns error on the first batch that fails; earlier batches stay applied.
    #[instrument(skip(self, records), fields(index = %self.index_name, records = records.len()))]
    pub async fn index_records(&self, records: &[SearchRecord]) -> Result<IndexReport, SearchError> {
        let operations = batch_operations(records);
        let mut report = IndexReport::default();

        for chunk in operations.chunks(BATCH_SIZE) {
            for op in chunk {
                match op {
                    BatchOperation::UpdateObject(_) => report.updated += 1,
                    BatchOperation::DeleteObject(_) => report.deleted += 1,
                }
            }
            self.send_batch(chunk).await?;
            report.batches += 1;
            debug!(batch = report.batches, size = chunk.len(), "Sent search batch");
        }

        info!(
            updated = report.updated,
            deleted = report.deleted,
            batches = report.batches,
            "Search index updated"
        );
        Ok(report)
    }

    async fn send_batch(&self, operations: &[BatchOperation<'_>]) -> Result<(), SearchError> {
        let url = format!(
            "https://{}.algolia.net/1/indexes/{}/batch",
            self.app_id, self.index_name
        );
        let body = BatchRequest {
            requests: operations,
        };

        let response = self
            .client
            .post(url)
            .header("X-Algolia-Application-Id", &self.app_id)
            .header("X-Algolia-API-Key", self.admin_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Map records to batch operations: active products are upserted, inactive removed.
#[must_use]
pub fn batch_operations(records: &[SearchRecord]) -> Vec<BatchOperation<'_>> {
    records
        .iter()
        .map(|record| {
            if record.is_active {
                BatchOperation::UpdateObject(record)
            } else {
                BatchOperation::DeleteObject(DeleteBody {
                    object_id: &record.object_id,
                })
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn record(slug: &str, is_active: bool) -> SearchRecord {
        SearchRecord {
            object_id: slug.to_string(),
            name: "Muslin Swaddle".to_string(),
            description: "Breathable cotton".to_string(),
            category: Some("Sleep".to_string()),
            image_url: None,
            price_from: Some(Decimal::new(2499, 2)),
            skus: vec!["SW-SAGE".to_string()],
            in_stock: true,
            is_active,
        }
    }

    #[test]
    fn test_batch_operations_serialize() {
        let records = vec![record("muslin-swaddle", true), record("old-rattle", false)];
        let operations = batch_operations(&records);
        let body = BatchRequest {
            requests: &operations,
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["requests"][0]["action"], "updateObject");
        assert_eq!(json["requests"][0]["body"]["objectID"], "muslin-swaddle");
        assert_eq!(json["requests"][0]["body"]["price_from"], "24.99");
        assert!(json["requests"][0]["body"].get("is_active").is_none());

        assert_eq!(json["requests"][1]["action"], "deleteObject");
        assert_eq!(json["requests"][1]["body"]["objectID"], "old-rattle");
    }
}

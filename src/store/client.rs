//! Key-value client seam
//!
//! The production client talks to the store's REST gateway; tests provide an
//! in-memory implementation.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use super::row_key;
use super::types::StoreError;

/// A thread-safe point lookup into one table of the key-value store
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Fetch the cell stored at `row`, or `None` when the row is absent
    async fn get(&self, table: &str, row: &[u8]) -> Result<Option<Bytes>, StoreError>;
}

/// REST gateway client. Rows are addressed as `{base}/{table}/{hex(row)}`
/// and absent rows are a 404.
pub struct RestKvClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestKvClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl KvClient for RestKvClient {
    async fn get(&self, table: &str, row: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let url = format!("{}/{}/{}", self.base_url, table, row_key::hex(row));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(Some(body))
            }
            status => Err(StoreError::Backend(format!("store returned {status}"))),
        }
    }
}

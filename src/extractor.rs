//! Client for the external media-extraction engine.
//!
//! The engine is an external collaborator: given a content identifier it
//! returns a metadata document containing direct origin media URLs. The
//! trait seam lets integration tests substitute a canned document.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProxyError;

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, content_id: &str) -> Result<Value, ProxyError>;
}

/// HTTP extraction engine: `GET {base_url}/{content_id}` returning JSON.
pub struct HttpExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractor {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

#[async_trait]
impl MetadataExtractor for HttpExtractor {
    async fn extract(&self, content_id: &str) -> Result<Value, ProxyError> {
        let url = format!("{}/{}", self.base_url, content_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProxyError::Extraction(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProxyError::Extraction(format!(
                "extraction engine returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| ProxyError::Extraction(e.to_string()))
    }
}

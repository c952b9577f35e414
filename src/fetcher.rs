//! HTTP client for the delta update endpoint.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SyncError;
use crate::model::{Category, Cursor, UpdatePayload};
use crate::validation::validate_base_url;

#[cfg(test)]
use mockall::automock;

const UPDATES_PATH: [&str; 3] = ["api", "database", "updates"];

/// Maximum accepted response body (64 MB)
const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Source of update payloads
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Fetch everything changed since `cursor`, or the full dataset when `None`.
    async fn fetch(&self, cursor: Option<Cursor>) -> Result<UpdatePayload, SyncError>;
}

/// Fetches deltas with a single GET per call. Never retries: the scheduler's
/// interval is the retry policy.
pub struct DeltaFetcher {
    client: Client,
    endpoint: Url,
}

impl DeltaFetcher {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        if config.api_base_url.trim().is_empty() {
            return Err(SyncError::Config(
                "api_base_url is not set (config file or TARGET_API)".to_string(),
            ));
        }
        Self::with_timeout(&config.api_base_url, config.fetch_timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base = validate_base_url(base_url).map_err(|e| SyncError::Config(format!("{:#}", e)))?;
        let endpoint = updates_endpoint(base)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("intelsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Request URL for a cursor; the `delta` parameter is omitted before the first sync.
    pub fn build_url(&self, cursor: Option<Cursor>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(cursor) = cursor {
            url.query_pairs_mut()
                .append_pair("delta", &cursor.to_delta_param());
        }
        url
    }

    async fn fetch_body(&self, url: &Url) -> Result<Vec<u8>, SyncError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_RESPONSE_SIZE as u64 {
                return Err(SyncError::Parse(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    content_length, MAX_RESPONSE_SIZE
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::Network(format!("Failed to read response body: {}", e)))?
        {
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(SyncError::Parse(format!(
                    "Response too large: more than {} bytes",
                    MAX_RESPONSE_SIZE
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl DeltaSource for DeltaFetcher {
    async fn fetch(&self, cursor: Option<Cursor>) -> Result<UpdatePayload, SyncError> {
        let url = self.build_url(cursor);
        debug!(url = %url, "Fetching updates");

        let body = self.fetch_body(&url).await?;
        let text = std::str::from_utf8(&body)
            .map_err(|e| SyncError::Parse(format!("Response is not UTF-8: {}", e)))?;
        let payload = UpdatePayload::from_json(text)?;

        info!(
            bytes = body.len(),
            signatures = payload.entries(Category::MalwareSignatures).len(),
            rules = payload.entries(Category::YaraRules).len(),
            ips = payload.entries(Category::BlacklistedIps).len(),
            "Fetched updates"
        );

        Ok(payload)
    }
}

fn updates_endpoint(mut base: Url) -> Result<Url, SyncError> {
    if base.cannot_be_a_base() {
        return Err(SyncError::Config(format!("Base URL cannot have a path: {}", base)));
    }
    if let Ok(mut segments) = base.path_segments_mut() {
        segments.pop_if_empty().extend(UPDATES_PATH);
    }
    Ok(base)
}

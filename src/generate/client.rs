//! Upstream generation client.
//!
//! The orchestrator talks to the upstream service only through the
//! [`GenerationClient`] trait; tests substitute scripted fakes and the
//! production implementation is a thin reqwest wrapper that reports the raw
//! status and body for classification.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::Config;

// ============================================================================
// Trait and wire types
// ============================================================================

/// One upstream HTTP exchange, successful at the transport level.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    /// Raw response body: image bytes on success, an error body otherwise.
    pub body: Bytes,
}

/// Transport-level failures, before any HTTP status exists.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Seam between the orchestrator and the upstream service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn submit(&self, body: &serde_json::Value) -> Result<UpstreamReply, UpstreamError>;
}

// ============================================================================
// Segmind client
// ============================================================================

/// Client for the Segmind generation endpoint.
pub struct SegmindClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl SegmindClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.upstream_url.clone(),
            api_key: config.upstream_api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerationClient for SegmindClient {
    async fn submit(&self, body: &serde_json::Value) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_transport)?;

        Ok(UpstreamReply { status, body })
    }
}

fn classify_transport(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Request(e)
    }
}

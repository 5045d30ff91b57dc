//! Photo payloads and the representations the upstream service can consume.
//!
//! A photo arrives as raw bytes plus, when the transport provides one, the
//! remote file path Telegram assigned to it. From that we derive the two
//! representations candidate formats may require: a lossless inline base64
//! encoding and, best-effort, a publicly dereferenceable URL.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

// -----------------------------------------------------------------------------
// PhotoPayload
// -----------------------------------------------------------------------------

/// Raw photo bytes owned by a session until generation consumes them.
#[derive(Clone)]
pub struct PhotoPayload {
    pub bytes: Bytes,
    /// Transport-side file path, if the transport exposed one.
    pub remote_path: Option<String>,
}

impl PhotoPayload {
    pub fn new(bytes: impl Into<Bytes>, remote_path: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            remote_path,
        }
    }
}

impl fmt::Debug for PhotoPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoPayload")
            .field("bytes", &self.bytes.len())
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Inline encoding
// -----------------------------------------------------------------------------

/// Encode photo bytes for inline transport. Deterministic and lossless.
pub fn encode_inline(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode an inline encoding back into bytes.
pub fn decode_inline(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded)
}

// -----------------------------------------------------------------------------
// PhotoHost
// -----------------------------------------------------------------------------

/// Failure to obtain a public URL for a photo. Never fatal to generation.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("photo has no transport file path to publish")]
    NoRemotePath,
}

/// Collaborator that turns a photo into a short-lived public URL.
#[async_trait]
pub trait PhotoHost: Send + Sync {
    async fn publish(&self, photo: &PhotoPayload) -> Result<String, HostError>;
}

/// Host backed by Telegram's file API.
///
/// Telegram already stores every received photo and serves it at a URL
/// derived from the bot token and the file path, so publishing is a pure
/// string operation rather than an upload.
pub struct TelegramFileHost {
    token: String,
}

impl TelegramFileHost {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl PhotoHost for TelegramFileHost {
    async fn publish(&self, photo: &PhotoPayload) -> Result<String, HostError> {
        let path = photo.remote_path.as_deref().ok_or(HostError::NoRemotePath)?;
        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.token, path
        ))
    }
}

// -----------------------------------------------------------------------------
// PhotoRepresentations
// -----------------------------------------------------------------------------

/// The encodings of one photo that candidate formats choose from.
#[derive(Debug, Clone)]
pub struct PhotoRepresentations {
    /// Inline base64 encoding; always available.
    pub inline: String,
    /// Public URL; absent when hosting failed or was unavailable.
    pub url: Option<String>,
}

impl PhotoRepresentations {
    /// Prepare both representations.
    ///
    /// Hosting is a best-effort side channel: on failure the URL is simply
    /// absent and URL-consuming formats will be skipped.
    pub async fn prepare(photo: &PhotoPayload, host: &dyn PhotoHost) -> Self {
        let url = match host.publish(photo).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "photo hosting failed, continuing with inline encoding only");
                None
            }
        };

        Self {
            inline: encode_inline(&photo.bytes),
            url,
        }
    }
}

//! Result delivery and progress reporting.
//!
//! The orchestrator never talks to the chat platform directly: it emits
//! progress through a [`ProgressSink`] and the final result through a
//! [`Transport`]. Exactly one user-facing message is produced per generation
//! attempt, success or failure.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::generate::{GenerateError, GeneratedImage};

/// Caption attached to every successful result.
pub const SUCCESS_CAPTION: &str = "Done! How do you like the new look? ✨";

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat: &str, text: &str) -> Result<(), TransportError>;
    async fn send_image(
        &self,
        chat: &str,
        bytes: Bytes,
        caption: &str,
    ) -> Result<(), TransportError>;
}

// ============================================================================
// Progress
// ============================================================================

/// Intermediate updates emitted while a generation is running.
#[derive(Debug, Clone, Copy)]
pub enum ProgressUpdate {
    /// A candidate format is about to be submitted.
    Submitting { format: &'static str },
    /// A transient failure is being retried after a backoff wait.
    Retrying {
        format: &'static str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
}

/// Receives progress updates. Implementations must not fail the generation.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, update: ProgressUpdate);
}

/// Sink that drops every update.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn notify(&self, _update: ProgressUpdate) {}
}

// ============================================================================
// Delivery
// ============================================================================

/// Map a terminal failure to its single user-facing message.
///
/// `Cancelled` has no message: the cancel path already answered the user.
pub fn failure_message(err: &GenerateError) -> Option<String> {
    let text = match err {
        GenerateError::FormatsExhausted { .. } => {
            "😔 The stylist service rejected every request format we tried. \
             Please try again later, ideally with a different photo."
                .to_string()
        }
        GenerateError::ServiceUnavailable { .. } => {
            "😔 The stylist service is overloaded right now. \
             Please try again in a few minutes."
                .to_string()
        }
        GenerateError::Upstream { .. } => {
            "😔 Something went wrong talking to the stylist service. \
             Check the API key or try again later."
                .to_string()
        }
        GenerateError::Cancelled => return None,
    };
    Some(text)
}

/// Message for failures outside the generation taxonomy.
pub const INTERNAL_ERROR_TEXT: &str =
    "😔 Oops, something went wrong. Please try again with another photo.";

/// Emit the outcome of a generation to the user.
pub async fn deliver(
    transport: &dyn Transport,
    chat: &str,
    result: Result<GeneratedImage, GenerateError>,
) -> Result<(), TransportError> {
    match result {
        Ok(image) => {
            debug!(chat = %chat, format = image.format, "delivering generated image");
            transport
                .send_image(chat, image.bytes, SUCCESS_CAPTION)
                .await
        }
        Err(err) => match failure_message(&err) {
            Some(text) => transport.send_text(chat, &text).await,
            None => Ok(()),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        texts: Mutex<Vec<String>>,
        images: Mutex<Vec<(Bytes, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, _chat: &str, text: &str) -> Result<(), TransportError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_image(
            &self,
            _chat: &str,
            bytes: Bytes,
            caption: &str,
        ) -> Result<(), TransportError> {
            self.images
                .lock()
                .unwrap()
                .push((bytes, caption.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn success_sends_image_with_caption() {
        let transport = RecordingTransport::default();
        let image = GeneratedImage {
            bytes: Bytes::from_static(b"portrait"),
            format: "inline-image",
        };

        deliver(&transport, "42", Ok(image)).await.unwrap();

        let images = transport.images.lock().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0.as_ref(), b"portrait");
        assert_eq!(images[0].1, SUCCESS_CAPTION);
        assert!(transport.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_failure_kind_gets_one_distinct_message() {
        let transport = RecordingTransport::default();

        deliver(
            &transport,
            "42",
            Err(GenerateError::FormatsExhausted { tried: 3 }),
        )
        .await
        .unwrap();
        deliver(
            &transport,
            "42",
            Err(GenerateError::ServiceUnavailable { attempts: 3 }),
        )
        .await
        .unwrap();
        deliver(
            &transport,
            "42",
            Err(GenerateError::Upstream {
                status: 401,
                message: "nope".into(),
            }),
        )
        .await
        .unwrap();

        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("rejected every request format"));
        assert!(texts[1].contains("overloaded"));
        assert!(texts[2].contains("API key"));
        assert!(transport.images.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_sends_nothing() {
        let transport = RecordingTransport::default();

        deliver(&transport, "42", Err(GenerateError::Cancelled))
            .await
            .unwrap();

        assert!(transport.texts.lock().unwrap().is_empty());
        assert!(transport.images.lock().unwrap().is_empty());
    }
}

//! End-to-end scenarios over the session store, the negotiation loop, and
//! result delivery, with the upstream service and the chat transport faked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use restyle_bot::delivery::{self, NullProgress, Transport, TransportError, SUCCESS_CAPTION};
use restyle_bot::generate::{
    negotiate, GenerateError, GenerationClient, RetryPolicy, UpstreamError, UpstreamReply,
    CANDIDATE_FORMATS,
};
use restyle_bot::photo::{PhotoHost, PhotoPayload, PhotoRepresentations, HostError};
use restyle_bot::{Hairstyle, SessionError, SessionState, SessionStore};

// ============================================================================
// Fakes
// ============================================================================

struct FakeClient {
    replies: Mutex<VecDeque<Result<UpstreamReply, UpstreamError>>>,
    submissions: AtomicU32,
}

impl FakeClient {
    fn scripted(replies: Vec<Result<UpstreamReply, UpstreamError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            submissions: AtomicU32::new(0),
        }
    }

    fn submissions(&self) -> u32 {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for FakeClient {
    async fn submit(&self, _body: &serde_json::Value) -> Result<UpstreamReply, UpstreamError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("fake client ran out of scripted replies")
    }
}

struct StaticHost;

#[async_trait]
impl PhotoHost for StaticHost {
    async fn publish(&self, _photo: &PhotoPayload) -> Result<String, HostError> {
        Ok("https://files.example/selfie.jpg".to_string())
    }
}

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

// ============================================================================
// Helpers
// ============================================================================

fn ok(status: u16, body: &[u8]) -> Result<UpstreamReply, UpstreamError> {
    Ok(UpstreamReply {
        status,
        body: Bytes::copy_from_slice(body),
    })
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

fn store() -> SessionStore {
    SessionStore::new(Duration::from_secs(600))
}

fn selfie() -> PhotoPayload {
    PhotoPayload::new(vec![0xFF, 0xD8, 0xFF], Some("photos/selfie.jpg".to_string()))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn second_format_succeeds_after_payload_rejection() {
    let store = store();
    store.begin("42");
    store.attach_photo("42", selfie()).unwrap();
    store.attach_style("42", Hairstyle::LongCurly).unwrap();

    let (photo, style, mut cancel) = store.begin_generation("42").unwrap();
    assert_eq!(style, Hairstyle::LongCurly);

    let representations = PhotoRepresentations::prepare(&photo, &StaticHost).await;
    let client = FakeClient::scripted(vec![
        ok(422, b"unacceptable payload"),
        ok(200, b"generated-bytes"),
    ]);

    let result = negotiate(
        &client,
        CANDIDATE_FORMATS,
        &representations,
        style,
        &fast_policy(),
        &NullProgress,
        &mut cancel,
    )
    .await;

    let transport = RecordingTransport::default();
    delivery::deliver(&transport, "42", result).await.unwrap();
    store.clear("42");

    // The second candidate's bytes were delivered with the fixed caption.
    let images = transport.images.lock().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].0.as_ref(), b"generated-bytes");
    assert_eq!(images[0].1, SUCCESS_CAPTION);
    assert!(transport.texts.lock().unwrap().is_empty());
    assert_eq!(client.submissions(), 2);

    // The conversation is over until the user restarts.
    assert_eq!(store.state("42"), None);
    assert_eq!(
        store.attach_style("42", Hairstyle::BobCut),
        Err(SessionError::NoActiveSession)
    );
}

#[tokio::test]
async fn transient_exhaustion_yields_exactly_one_message() {
    let store = store();
    store.begin("42");
    store.attach_photo("42", selfie()).unwrap();
    store.attach_style("42", Hairstyle::BobCut).unwrap();

    let (photo, style, mut cancel) = store.begin_generation("42").unwrap();
    let representations = PhotoRepresentations::prepare(&photo, &StaticHost).await;

    // Full retry budget of transient failures on the first candidate; the
    // queued success must never be consulted.
    let client = FakeClient::scripted(vec![
        ok(503, b"overloaded"),
        ok(503, b"overloaded"),
        ok(503, b"overloaded"),
        ok(200, b"never-reached"),
    ]);

    let result = negotiate(
        &client,
        CANDIDATE_FORMATS,
        &representations,
        style,
        &fast_policy(),
        &NullProgress,
        &mut cancel,
    )
    .await;
    assert!(matches!(
        result,
        Err(GenerateError::ServiceUnavailable { attempts: 3 })
    ));
    assert_eq!(client.submissions(), 3);

    let transport = RecordingTransport::default();
    delivery::deliver(&transport, "42", result).await.unwrap();
    store.clear("42");

    let texts = transport.texts.lock().unwrap();
    assert_eq!(texts.len(), 1, "exactly one user-facing failure message");
    assert!(texts[0].contains("overloaded"));
    assert!(transport.images.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_while_awaiting_style_makes_no_upstream_call() {
    let store = store();
    store.begin("42");
    store.attach_photo("42", selfie()).unwrap();
    assert_eq!(store.state("42"), Some(SessionState::AwaitingStyle));

    let client = FakeClient::scripted(vec![]);
    assert!(store.cancel("42"));

    assert_eq!(store.state("42"), None);
    assert_eq!(client.submissions(), 0);
    assert_eq!(
        store.attach_style("42", Hairstyle::ShortPixie),
        Err(SessionError::NoActiveSession)
    );
}

#[tokio::test]
async fn hosting_failure_still_produces_an_image() {
    struct NoHost;

    #[async_trait]
    impl PhotoHost for NoHost {
        async fn publish(&self, _photo: &PhotoPayload) -> Result<String, HostError> {
            Err(HostError::NoRemotePath)
        }
    }

    let store = store();
    store.begin("42");
    store.attach_photo("42", selfie()).unwrap();
    store.attach_style("42", Hairstyle::RainbowColored).unwrap();

    let (photo, style, mut cancel) = store.begin_generation("42").unwrap();
    let representations = PhotoRepresentations::prepare(&photo, &NoHost).await;
    assert!(representations.url.is_none());

    // The URL candidate is skipped outright, the first inline shape wins.
    let client = FakeClient::scripted(vec![ok(200, b"inline-result")]);

    let image = negotiate(
        &client,
        CANDIDATE_FORMATS,
        &representations,
        style,
        &fast_policy(),
        &NullProgress,
        &mut cancel,
    )
    .await
    .unwrap();

    assert_eq!(image.format, "inline-image");
    assert_eq!(image.bytes.as_ref(), b"inline-result");
    assert_eq!(client.submissions(), 1);
}

//! The image-generation request orchestrator.
//!
//! [`negotiate`] walks an ordered list of candidate payload shapes and, for
//! each one, runs a bounded retry loop with exponential backoff. Outcomes are
//! classified per attempt: a payload-shape rejection abandons the candidate,
//! transient failures and timeouts are retried, anything else (credentials,
//! unknown statuses) fails the whole request immediately so it is never masked
//! by trying more shapes. Negotiation is strictly sequential: at most one
//! upstream call is in flight, and candidates are never probed speculatively.

mod client;
mod error;
mod format;
mod retry;

pub use client::{GenerationClient, SegmindClient, UpstreamError, UpstreamReply};
pub use error::GenerateError;
pub use format::{CandidateFormat, ImageField, CANDIDATE_FORMATS};
pub use retry::RetryPolicy;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::delivery::{ProgressSink, ProgressUpdate};
use crate::photo::PhotoRepresentations;
use crate::styles::Hairstyle;

use retry::{classify, AttemptOutcome};

// ============================================================================
// GeneratedImage
// ============================================================================

/// A successful result: the image bytes and the format that produced them.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub format: &'static str,
}

// ============================================================================
// Negotiation
// ============================================================================

/// Verdict of one candidate's retry loop.
enum FormatVerdict {
    Generated(Bytes),
    NextFormat,
}

/// Try candidate formats in order until one yields a usable image.
///
/// `cancel` is flipped by `/cancel` or idle eviction; it is checked before
/// every attempt and raced against each backoff sleep, so an in-flight
/// generation never blocks on a sleeping retry.
pub async fn negotiate(
    client: &dyn GenerationClient,
    candidates: &[CandidateFormat],
    photo: &PhotoRepresentations,
    style: Hairstyle,
    policy: &RetryPolicy,
    progress: &dyn ProgressSink,
    cancel: &mut watch::Receiver<bool>,
) -> Result<GeneratedImage, GenerateError> {
    let mut tried = 0;

    for candidate in candidates {
        let Some(body) = candidate.payload(photo, style) else {
            debug!(format = candidate.name, "skipping candidate, required representation unavailable");
            continue;
        };
        tried += 1;
        progress
            .notify(ProgressUpdate::Submitting {
                format: candidate.name,
            })
            .await;

        match try_format(client, candidate, &body, policy, progress, cancel).await? {
            FormatVerdict::Generated(bytes) => {
                info!(format = candidate.name, size = bytes.len(), "generation succeeded");
                return Ok(GeneratedImage {
                    bytes,
                    format: candidate.name,
                });
            }
            FormatVerdict::NextFormat => continue,
        }
    }

    warn!(tried, "every candidate format was rejected");
    Err(GenerateError::FormatsExhausted { tried })
}

/// Run the retry loop for a single candidate format.
async fn try_format(
    client: &dyn GenerationClient,
    candidate: &CandidateFormat,
    body: &serde_json::Value,
    policy: &RetryPolicy,
    progress: &dyn ProgressSink,
    cancel: &mut watch::Receiver<bool>,
) -> Result<FormatVerdict, GenerateError> {
    let mut attempt: u32 = 1;

    loop {
        if *cancel.borrow() {
            return Err(GenerateError::Cancelled);
        }

        match classify(client.submit(body).await) {
            AttemptOutcome::Success(bytes) => return Ok(FormatVerdict::Generated(bytes)),
            AttemptOutcome::AbandonFormat { status } => {
                debug!(
                    format = candidate.name,
                    status, "payload shape rejected, moving to next candidate"
                );
                return Ok(FormatVerdict::NextFormat);
            }
            AttemptOutcome::Fatal { status, message } => {
                warn!(format = candidate.name, status, "fatal upstream failure");
                return Err(GenerateError::Upstream { status, message });
            }
            outcome @ (AttemptOutcome::Transient { .. } | AttemptOutcome::TimedOut) => {
                if attempt >= policy.max_attempts {
                    warn!(
                        format = candidate.name,
                        attempts = attempt,
                        "retry budget exhausted"
                    );
                    return Err(GenerateError::ServiceUnavailable { attempts: attempt });
                }

                let delay = policy.delay_after(attempt);
                debug!(
                    format = candidate.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    outcome = ?outcome,
                    "transient failure, backing off"
                );
                progress
                    .notify(ProgressUpdate::Retrying {
                        format: candidate.name,
                        attempt,
                        max_attempts: policy.max_attempts,
                        delay,
                    })
                    .await;

                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    changed = cancel.changed() => changed.is_ok() && *cancel.borrow(),
                };
                if cancelled || *cancel.borrow() {
                    return Err(GenerateError::Cancelled);
                }
                attempt += 1;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

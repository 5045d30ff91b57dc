//! Retry policy and per-attempt outcome classification.

use std::time::Duration;

use bytes::Bytes;

use super::client::{UpstreamError, UpstreamReply};

/// How long an upstream error body is quoted in diagnostics.
const ERROR_BODY_LIMIT: usize = 256;

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per candidate format.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after `failed_attempts` failures (>= 1).
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempts.saturating_sub(1))
    }
}

// ============================================================================
// Attempt classification
// ============================================================================

/// What one upstream call means for the negotiation loop.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// Usable image bytes.
    Success(Bytes),
    /// The payload shape itself was rejected; move to the next candidate.
    AbandonFormat { status: u16 },
    /// Overload or unavailability; retry this candidate with backoff.
    Transient { status: u16 },
    /// The request never completed; retried like a transient failure.
    TimedOut,
    /// A failure format fallback must not mask; fatal to the whole request.
    Fatal { status: u16, message: String },
}

pub(crate) fn classify(result: Result<UpstreamReply, UpstreamError>) -> AttemptOutcome {
    match result {
        Ok(reply) if (200..300).contains(&reply.status) => AttemptOutcome::Success(reply.body),
        Ok(reply) => match reply.status {
            // The upstream signals "unacceptable payload" inconsistently.
            400 | 413 | 422 => AttemptOutcome::AbandonFormat {
                status: reply.status,
            },
            429 | 500 | 502 | 503 | 504 => AttemptOutcome::Transient {
                status: reply.status,
            },
            status => AttemptOutcome::Fatal {
                status,
                message: error_excerpt(&reply.body),
            },
        },
        Err(UpstreamError::Timeout) => AttemptOutcome::TimedOut,
        // Connection-level failures share the transient budget; retrying is
        // the only useful reaction to a flaky link.
        Err(UpstreamError::Request(_)) => AttemptOutcome::Transient { status: 0 },
    }
}

fn error_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut excerpt: String = text.chars().take(ERROR_BODY_LIMIT).collect();
    if text.chars().count() > ERROR_BODY_LIMIT {
        excerpt.push('…');
    }
    excerpt
}

// ============================================================================
// Tests
// ============================================================================

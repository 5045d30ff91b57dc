//! Generation error types.

use thiserror::Error;

/// Terminal outcomes of one generation attempt, after negotiation and
/// retries are exhausted. Exactly one user-facing message is derived from
/// each of these.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Every candidate payload shape was rejected by the upstream service.
    #[error("all {tried} candidate formats were rejected by the upstream service")]
    FormatsExhausted { tried: usize },

    /// Transient failures outlasted the retry budget.
    #[error("upstream service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    /// A status that format fallback must not mask (credentials, unknown 4xx/5xx).
    #[error("upstream request failed (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// The user cancelled, or the session was evicted, mid-generation.
    #[error("generation cancelled")]
    Cancelled,
}

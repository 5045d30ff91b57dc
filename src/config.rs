//! Startup configuration.
//!
//! Built once from the process environment and passed into the bot; there are
//! no ambient globals. Two secrets are required, everything else has a
//! sensible default.

use std::time::Duration;

use thiserror::Error;

use crate::generate::RetryPolicy;

const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
const SEGMIND_API_KEY: &str = "SEGMIND_API_KEY";
const SEGMIND_API_URL: &str = "SEGMIND_API_URL";
const UPSTREAM_TIMEOUT_SECS: &str = "UPSTREAM_TIMEOUT_SECS";
const GENERATE_MAX_ATTEMPTS: &str = "GENERATE_MAX_ATTEMPTS";
const GENERATE_BASE_DELAY_SECS: &str = "GENERATE_BASE_DELAY_SECS";
const SESSION_IDLE_TIMEOUT_SECS: &str = "SESSION_IDLE_TIMEOUT_SECS";

// -----------------------------------------------------------------------------
// Config
// -----------------------------------------------------------------------------

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token from BotFather.
    pub telegram_token: String,
    /// API key for the upstream image-generation service.
    pub upstream_api_key: String,
    /// Upstream generation endpoint.
    pub upstream_url: String,
    /// Per-request timeout for upstream calls.
    pub upstream_timeout_secs: u64,
    /// Attempts per candidate format before the generation fails.
    pub max_attempts: u32,
    /// Base backoff delay, doubled on each retry.
    pub base_delay_secs: u64,
    /// Idle window after which a session is discarded.
    pub idle_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Tests pass a closure over a map instead of mutating the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_token = require(&lookup, TELEGRAM_TOKEN)?;
        let upstream_api_key = require(&lookup, SEGMIND_API_KEY)?;

        Ok(Self {
            telegram_token,
            upstream_api_key,
            upstream_url: lookup(SEGMIND_API_URL).unwrap_or_else(default_upstream_url),
            upstream_timeout_secs: parse_or(&lookup, UPSTREAM_TIMEOUT_SECS, 120)?,
            max_attempts: parse_or(&lookup, GENERATE_MAX_ATTEMPTS, 3)?,
            base_delay_secs: parse_or(&lookup, GENERATE_BASE_DELAY_SECS, 5)?,
            idle_timeout_secs: parse_or(&lookup, SESSION_IDLE_TIMEOUT_SECS, 600)?,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_delay_secs),
        }
    }
}

fn default_upstream_url() -> String {
    "https://api.segmind.com/v1/nano-banana".to_string()
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingSecret(key)),
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

/// Startup configuration failures; fatal before the bot connects.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingSecret(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

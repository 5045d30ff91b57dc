//! Telegram bot that previews new hairstyles on a user selfie.
//!
//! The bot collects a photo and a style choice, then drives an
//! image-generation request against a loosely-documented upstream API.
//! Because the upstream accepts several incompatible payload shapes and
//! degrades under load, the [`generate`] module probes candidate request
//! formats in order and retries transient failures with exponential backoff.

pub mod bot;
pub mod config;
pub mod delivery;
pub mod generate;
pub mod photo;
pub mod session;
pub mod styles;

pub use config::{Config, ConfigError};
pub use generate::{GenerateError, GeneratedImage};
pub use session::{SessionError, SessionState, SessionStore};
pub use styles::Hairstyle;

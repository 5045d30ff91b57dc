//! Session error types.

use thiserror::Error;

/// User-correctable session failures; the caller re-prompts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No session was begun for this chat, or it timed out / ended.
    #[error("no active session for this chat")]
    NoActiveSession,

    /// A style was offered before a photo was attached.
    #[error("no photo attached yet")]
    PhotoMissing,

    /// Generation was requested before a style was chosen.
    #[error("no style selected yet")]
    StyleMissing,
}

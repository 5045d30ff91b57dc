//! Per-conversation session state.
//!
//! The store keeps one [`Session`] per chat in a [`DashMap`], so mutations on
//! one conversation never block another. Each entry tracks where the
//! conversation stands (awaiting photo, awaiting style, terminal), the data
//! collected so far, and an idle clock that every successful mutation resets.
//! Expired entries are dropped lazily on access and proactively by the bot's
//! sweeper task.

mod error;

pub use error::SessionError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::photo::PhotoPayload;
use crate::styles::Hairstyle;

// ============================================================================
// Session State
// ============================================================================

/// Position in the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the user's selfie.
    AwaitingPhoto,
    /// Photo accepted, waiting for a style choice.
    AwaitingStyle,
    /// Generation started or finished; only `/start` re-enters the flow.
    Terminal,
}

// ============================================================================
// Session
// ============================================================================

/// One user's in-progress request.
///
/// Invariant: `style` is never `Some` while `photo` is `None`.
struct Session {
    state: SessionState,
    photo: Option<PhotoPayload>,
    style: Option<Hairstyle>,
    last_activity: Instant,
    /// Present while a generation is in flight; signalled on cancel/evict.
    cancel: Option<watch::Sender<bool>>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::AwaitingPhoto,
            photo: None,
            style: None,
            last_activity: Instant::now(),
            cancel: None,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn expired(&self, idle_timeout: Duration) -> bool {
        self.last_activity.elapsed() > idle_timeout
    }

    fn signal_cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(true);
        }
    }
}

// ============================================================================
// Session Store
// ============================================================================

/// Store of per-chat sessions. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Create or reset the session for a chat, clearing any prior photo/style.
    pub fn begin(&self, chat: &str) {
        if let Some(mut existing) = self.sessions.get_mut(chat) {
            existing.signal_cancel();
        }
        self.sessions.insert(chat.to_string(), Session::new());
        debug!(chat = %chat, "session started");
    }

    /// Current state of the chat's session, or `None` if there is none.
    pub fn state(&self, chat: &str) -> Option<SessionState> {
        if self.evict_if_expired(chat) {
            return None;
        }
        self.sessions.get(chat).map(|s| s.state)
    }

    /// Attach the user's photo and advance to awaiting a style choice.
    ///
    /// Re-sending a photo before a style is chosen replaces the previous one.
    pub fn attach_photo(&self, chat: &str, photo: PhotoPayload) -> Result<(), SessionError> {
        self.with_live_session(chat, |session| match session.state {
            SessionState::AwaitingPhoto | SessionState::AwaitingStyle => {
                session.photo = Some(photo);
                session.style = None;
                session.state = SessionState::AwaitingStyle;
                session.touch();
                Ok(())
            }
            SessionState::Terminal => Err(SessionError::NoActiveSession),
        })
    }

    /// Record the chosen style. Requires a photo to be attached first.
    pub fn attach_style(&self, chat: &str, style: Hairstyle) -> Result<(), SessionError> {
        self.with_live_session(chat, |session| match session.state {
            SessionState::AwaitingStyle => {
                session.style = Some(style);
                session.touch();
                Ok(())
            }
            SessionState::AwaitingPhoto => Err(SessionError::PhotoMissing),
            SessionState::Terminal => Err(SessionError::NoActiveSession),
        })
    }

    /// Consume the collected photo and style, moving the session to
    /// [`SessionState::Terminal`].
    ///
    /// Returns a cancellation receiver tied to this generation; `cancel` and
    /// idle eviction flip it so an in-flight retry loop can bail out of its
    /// backoff wait.
    pub fn begin_generation(
        &self,
        chat: &str,
    ) -> Result<(PhotoPayload, Hairstyle, watch::Receiver<bool>), SessionError> {
        self.with_live_session(chat, |session| {
            let photo = session.photo.take().ok_or(SessionError::PhotoMissing)?;
            let style = match session.style.take() {
                Some(style) => style,
                None => {
                    // Leave the session usable: put the photo back.
                    session.photo = Some(photo);
                    return Err(SessionError::StyleMissing);
                }
            };

            let (tx, rx) = watch::channel(false);
            session.cancel = Some(tx);
            session.state = SessionState::Terminal;
            session.touch();
            Ok((photo, style, rx))
        })
    }

    /// Cancel the chat's session, signalling any in-flight generation.
    ///
    /// Returns `true` if a session existed.
    pub fn cancel(&self, chat: &str) -> bool {
        match self.sessions.remove(chat) {
            Some((_, mut session)) => {
                session.signal_cancel();
                debug!(chat = %chat, "session cancelled");
                true
            }
            None => false,
        }
    }

    /// Remove all state for a chat.
    pub fn clear(&self, chat: &str) {
        self.sessions.remove(chat);
    }

    /// Drop every idle-expired session, signalling in-flight generations.
    ///
    /// Returns the chat keys that were evicted so the caller can notify them.
    pub fn evict_idle(&self) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|chat, session| {
            if session.expired(self.idle_timeout) {
                session.signal_cancel();
                evicted.push(chat.clone());
                false
            } else {
                true
            }
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Run `f` against the chat's session under its map guard, after lazily
    /// evicting it if the idle window elapsed. The guard makes each mutation
    /// atomic with respect to the idle-clock reset.
    fn with_live_session<T>(
        &self,
        chat: &str,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if self.evict_if_expired(chat) {
            return Err(SessionError::NoActiveSession);
        }
        let mut entry = self
            .sessions
            .get_mut(chat)
            .ok_or(SessionError::NoActiveSession)?;
        f(entry.value_mut())
    }

    fn evict_if_expired(&self, chat: &str) -> bool {
        let expired = self
            .sessions
            .get(chat)
            .map(|s| s.expired(self.idle_timeout))
            .unwrap_or(false);
        if expired {
            if let Some((_, mut session)) = self.sessions.remove(chat) {
                session.signal_cancel();
                debug!(chat = %chat, "session expired");
            }
        }
        expired
    }
}

// ============================================================================
// Tests
// ============================================================================

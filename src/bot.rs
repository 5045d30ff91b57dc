//! Telegram front-end.
//!
//! Wires the session store and the generation orchestrator into a teloxide
//! dispatcher: `/start` and `/cancel` commands, a photo handler, and a
//! callback-query handler that kicks off generation. Each update is handled
//! on its own task, so one conversation's backoff waits never stall another.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use teloxide::dptree;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::delivery::{self, ProgressSink, ProgressUpdate, Transport, TransportError};
use crate::generate::{negotiate, RetryPolicy, SegmindClient, CANDIDATE_FORMATS};
use crate::photo::{PhotoPayload, PhotoRepresentations, TelegramFileHost};
use crate::session::{SessionError, SessionState, SessionStore};
use crate::styles::Hairstyle;

/// How often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const GREETING: &str = "👋 Hi! I can help you try on a new hairstyle with AI.\n\n\
                        Please send me a selfie (as a photo, not a document).";
const PHOTO_PROMPT: &str = "Please send a selfie as a photo (not a document), or /cancel.";
const STYLE_PROMPT: &str = "Great, photo received! Now pick a hairstyle:";
const STYLE_NUDGE: &str = "Use the buttons above to pick a hairstyle, or /cancel.";
const GENERATING: &str = "⏳ Sending your photo to the AI stylist… this can take about a minute.";
const BUSY: &str = "Hold on, I'm still working on your previous photo.";
const NO_SESSION: &str = "Send /start to begin.";
const CANCELLED: &str = "Action cancelled. Send /start to begin again.";
const SESSION_EXPIRED: &str = "⌛ Session timed out. Send /start to begin again.";
const PHOTO_LOST: &str = "😔 Photo not found. Please start again with /start.";

// ============================================================================
// Commands
// ============================================================================

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "start a new try-on session.")]
    Start,
    #[command(description = "cancel the current session.")]
    Cancel,
}

// ============================================================================
// App
// ============================================================================

/// Shared collaborators injected into every handler.
struct App {
    store: SessionStore,
    client: SegmindClient,
    host: TelegramFileHost,
    policy: RetryPolicy,
}

/// Run the bot until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let bot = Bot::new(config.telegram_token.clone());
    let app = Arc::new(App {
        store: SessionStore::new(config.idle_timeout()),
        client: SegmindClient::new(&config).context("failed to build upstream client")?,
        host: TelegramFileHost::new(config.telegram_token.clone()),
        policy: config.retry_policy(),
    });

    tokio::spawn(sweep_idle(bot.clone(), app.store.clone()));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("restyle bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_command(bot: Bot, msg: Message, cmd: Command, app: Arc<App>) -> ResponseResult<()> {
    let result = match cmd {
        Command::Start => on_start(&bot, &msg, &app).await,
        Command::Cancel => on_cancel(&bot, &msg, &app).await,
    };
    if let Err(e) = result {
        warn!(error = %e, "command handler failed");
    }
    respond(())
}

async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    if let Err(e) = on_message(&bot, &msg, &app).await {
        warn!(error = %e, "message handler failed");
    }
    respond(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, app: Arc<App>) -> ResponseResult<()> {
    let chat = q.message.as_ref().map(|m| m.chat.id);
    if let Err(e) = on_style_chosen(&bot, &q, &app).await {
        warn!(error = %e, "callback handler failed");
        if let Some(chat) = chat {
            // Best effort: the user should not be left silent.
            let _ = bot.send_message(chat, delivery::INTERNAL_ERROR_TEXT).await;
        }
    }
    respond(())
}

async fn on_start(bot: &Bot, msg: &Message, app: &App) -> Result<()> {
    let key = chat_key(msg.chat.id);
    app.store.begin(&key);
    bot.send_message(msg.chat.id, GREETING).await?;
    Ok(())
}

async fn on_cancel(bot: &Bot, msg: &Message, app: &App) -> Result<()> {
    let key = chat_key(msg.chat.id);
    let text = if app.store.cancel(&key) {
        CANCELLED
    } else {
        NO_SESSION
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Route a plain message by conversation state; a turn is never dropped
/// silently.
async fn on_message(bot: &Bot, msg: &Message, app: &App) -> Result<()> {
    let key = chat_key(msg.chat.id);

    match app.store.state(&key) {
        None => {
            bot.send_message(msg.chat.id, NO_SESSION).await?;
        }
        Some(SessionState::AwaitingPhoto) | Some(SessionState::AwaitingStyle)
            if msg.photo().is_some() =>
        {
            accept_photo(bot, msg, app, &key).await?;
        }
        Some(SessionState::AwaitingPhoto) => {
            bot.send_message(msg.chat.id, PHOTO_PROMPT).await?;
        }
        Some(SessionState::AwaitingStyle) => {
            bot.send_message(msg.chat.id, STYLE_NUDGE).await?;
        }
        Some(SessionState::Terminal) => {
            bot.send_message(msg.chat.id, BUSY).await?;
        }
    }
    Ok(())
}

/// Download the largest rendition of the photo and attach it to the session.
async fn accept_photo(bot: &Bot, msg: &Message, app: &App, key: &str) -> Result<()> {
    let sizes = msg.photo().context("message has no photo")?;
    let largest = sizes.last().context("photo message with no sizes")?;

    let file = bot.get_file(largest.file.id.clone()).await?;
    let mut bytes = Vec::new();
    bot.download_file(&file.path, &mut bytes)
        .await
        .context("failed to download photo from Telegram")?;

    debug!(chat = %key, size = bytes.len(), "photo downloaded");

    let payload = PhotoPayload::new(bytes, Some(file.path.clone()));
    match app.store.attach_photo(key, payload) {
        Ok(()) => {
            bot.send_message(msg.chat.id, STYLE_PROMPT)
                .reply_markup(style_keyboard())
                .await?;
        }
        Err(e) => {
            debug!(chat = %key, error = %e, "photo arrived for a dead session");
            bot.send_message(msg.chat.id, NO_SESSION).await?;
        }
    }
    Ok(())
}

/// Handle a style button press: record the choice and run the generation.
async fn on_style_chosen(bot: &Bot, q: &CallbackQuery, app: &App) -> Result<()> {
    // Clear the client-side spinner whatever happens next.
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(style) = Hairstyle::from_token(data) else {
        debug!(token = data, "ignoring unknown style token");
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat = message.chat.id;
    let key = chat_key(chat);

    if let Err(e) = app.store.attach_style(&key, style) {
        return send_session_error(bot, chat, e).await;
    }
    let (photo, style, mut cancel) = match app.store.begin_generation(&key) {
        Ok(taken) => taken,
        Err(e) => return send_session_error(bot, chat, e).await,
    };

    bot.send_message(chat, GENERATING).await?;

    let representations = PhotoRepresentations::prepare(&photo, &app.host).await;
    let progress = TelegramProgress {
        bot: bot.clone(),
        chat,
    };
    let result = negotiate(
        &app.client,
        CANDIDATE_FORMATS,
        &representations,
        style,
        &app.policy,
        &progress,
        &mut cancel,
    )
    .await;

    // The session is spent either way; release it before delivery so a
    // transport hiccup cannot leave the chat stuck until the idle sweep.
    app.store.clear(&key);

    let transport = TelegramTransport { bot: bot.clone() };
    delivery::deliver(&transport, &key, result).await?;
    Ok(())
}

async fn send_session_error(bot: &Bot, chat: ChatId, err: SessionError) -> Result<()> {
    let text = match err {
        SessionError::NoActiveSession => NO_SESSION,
        SessionError::PhotoMissing => PHOTO_LOST,
        SessionError::StyleMissing => STYLE_NUDGE,
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

fn style_keyboard() -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = Hairstyle::ALL
        .iter()
        .map(|style| vec![InlineKeyboardButton::callback(style.label(), style.token())])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn chat_key(chat: ChatId) -> String {
    chat.0.to_string()
}

// ============================================================================
// Idle sweeper
// ============================================================================

/// Periodically drop idle-expired sessions and tell their chats.
async fn sweep_idle(bot: Bot, store: SessionStore) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        for key in store.evict_idle() {
            match key.parse::<i64>() {
                Ok(id) => {
                    if let Err(e) = bot.send_message(ChatId(id), SESSION_EXPIRED).await {
                        warn!(error = %e, chat = %key, "failed to notify expired session");
                    }
                }
                Err(_) => warn!(chat = %key, "unparseable chat key during eviction"),
            }
        }
    }
}

// ============================================================================
// Transport adapters
// ============================================================================

/// Outbound delivery over the Telegram Bot API.
struct TelegramTransport {
    bot: Bot,
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat: &str, text: &str) -> Result<(), TransportError> {
        let chat = parse_chat(chat)?;
        self.bot
            .send_message(chat, text)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(())
    }

    async fn send_image(
        &self,
        chat: &str,
        bytes: Bytes,
        caption: &str,
    ) -> Result<(), TransportError> {
        let chat = parse_chat(chat)?;
        self.bot
            .send_photo(chat, InputFile::memory(bytes))
            .caption(caption.to_string())
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(())
    }
}

fn parse_chat(chat: &str) -> Result<ChatId, TransportError> {
    chat.parse::<i64>()
        .map(ChatId)
        .map_err(|_| TransportError::Send(format!("invalid chat id: {chat}")))
}

/// Progress sink that keeps the user informed during backoff waits.
struct TelegramProgress {
    bot: Bot,
    chat: ChatId,
}

#[async_trait]
impl ProgressSink for TelegramProgress {
    async fn notify(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Submitting { format } => {
                debug!(candidate = format, "submitting candidate format");
            }
            ProgressUpdate::Retrying {
                attempt,
                max_attempts,
                delay,
                ..
            } => {
                let text = format!(
                    "⏳ The stylist is busy, retrying ({} of {}) in {}s…",
                    attempt + 1,
                    max_attempts,
                    delay.as_secs()
                );
                if let Err(e) = self.bot.send_message(self.chat, text).await {
                    warn!(error = %e, "failed to send progress update");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn keyboard_has_one_button_per_style() {
        let keyboard = style_keyboard();
        assert_eq!(keyboard.inline_keyboard.len(), Hairstyle::ALL.len());

        for (row, style) in keyboard.inline_keyboard.iter().zip(Hairstyle::ALL) {
            assert_eq!(row.len(), 1);
            assert_eq!(row[0].text, style.label());
            match &row[0].kind {
                InlineKeyboardButtonKind::CallbackData(data) => {
                    assert_eq!(Hairstyle::from_token(data), Some(style));
                }
                other => panic!("unexpected button kind: {other:?}"),
            }
        }
    }

    #[test]
    fn chat_keys_are_stable_strings() {
        assert_eq!(chat_key(ChatId(42)), "42");
        assert_eq!(chat_key(ChatId(-100123)), "-100123");
    }
}

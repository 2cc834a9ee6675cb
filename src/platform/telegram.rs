use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, Recipient};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{CommandRouter, COMMANDS};
use crate::error::{DeliveryError, TransportError};
use crate::platform::{AlertSink, ChannelFeed, ChatKind, InboundMessage};
use crate::registry::ChannelId;

/// Delay between attempts to stop a dispatcher that is not running yet
const SHUTDOWN_RETRY: Duration = Duration::from_millis(50);

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Create the bot with an HTTP timeout longer than the long-polling timeout.
pub fn build_bot(token: &SecretString) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// Verify the token and register the command list. Returns the bot's
/// username.
pub async fn connect(bot: &Bot) -> Result<String> {
    let me = bot
        .get_me()
        .await
        .context("Failed to verify bot token with getMe")?;
    let username = me.username().to_string();
    info!(username = %username, "Telegram bot connected");

    let commands: Vec<BotCommand> = COMMANDS
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to register bot commands: {}", e);
    }
    Ok(username)
}

/// Convert a Telegram message into the transport-neutral form.
/// Media captions count as text; messages without either are skipped.
pub fn inbound_from(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text().or_else(|| msg.caption())?;

    let chat_kind = if msg.chat.is_channel() {
        ChatKind::Channel
    } else if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else if msg.chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Private
    };

    // Anonymous group admins arrive as GroupAnonymousBot with the group in
    // `sender_chat`.
    let sender = msg
        .sender_chat
        .as_ref()
        .map(|chat| chat.id.0)
        .or_else(|| {
            msg.from
                .as_ref()
                .and_then(|user| i64::try_from(user.id.0).ok())
        })
        .unwrap_or(msg.chat.id.0);

    Some(
        InboundMessage::new(
            sender,
            msg.chat.id.0,
            chat_kind,
            msg.chat.username().map(str::to_string),
            text,
        )
        .with_message_id(msg.id.0),
    )
}

/// Run the bot dispatcher until `cancel` fires.
///
/// Messages go to the command router; channel posts are queued for the
/// channel watcher.
pub async fn run(
    bot: Bot,
    router: Arc<CommandRouter>,
    posts: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Starting Telegram dispatcher...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_channel_post().endpoint(handle_channel_post));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, posts])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build();

    if cancel.is_cancelled() {
        return Ok(());
    }

    let shutdown = dispatcher.shutdown_token();
    let finished = CancellationToken::new();
    tokio::spawn(shutdown_when_cancelled(
        cancel,
        finished.clone(),
        move || {
            let token = shutdown.clone();
            if token.shutdown().is_err() {
                return None;
            }
            Some(async move {
                if let Ok(done) = token.shutdown() {
                    done.await;
                }
            })
        },
    ));

    dispatcher.dispatch().await;
    finished.cancel();
    info!("Telegram dispatcher stopped");
    Ok(())
}

/// Once `cancel` fires, keep asking the dispatcher to stop until it accepts.
/// A dispatcher that is still starting up refuses, so the request is
/// repeated until it is running or `finished` reports it has exited.
async fn shutdown_when_cancelled<F, Fut>(
    cancel: CancellationToken,
    finished: CancellationToken,
    mut try_shutdown: F,
) where
    F: FnMut() -> Option<Fut>,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = finished.cancelled() => return,
    }

    loop {
        if let Some(done) = try_shutdown() {
            done.await;
            return;
        }
        debug!("Dispatcher not running yet, retrying shutdown");
        tokio::select! {
            _ = finished.cancelled() => return,
            _ = tokio::time::sleep(SHUTDOWN_RETRY) => {}
        }
    }
}

async fn handle_message(bot: Bot, msg: Message, router: Arc<CommandRouter>) -> ResponseResult<()> {
    let inbound = match inbound_from(&msg) {
        Some(inbound) => inbound,
        None => return Ok(()),
    };

    debug!(
        identity = inbound.sender_identity,
        chat = inbound.chat_identity,
        "Telegram message received"
    );

    if let Some(reply) = router.respond(&inbound) {
        for chunk in split_message(&reply, 4000) {
            bot.send_message(msg.chat.id, chunk).await?;
        }
    }

    Ok(())
}

async fn handle_channel_post(
    msg: Message,
    posts: mpsc::Sender<InboundMessage>,
) -> ResponseResult<()> {
    let post = match inbound_from(&msg) {
        Some(post) => post,
        None => {
            debug!(chat = msg.chat.id.0, "Channel post without text");
            return Ok(());
        }
    };

    if posts.send(post).await.is_err() {
        warn!(chat = msg.chat.id.0, "Channel watcher is not running, dropping post");
    }
    Ok(())
}

/// Channel feed over the bot's own update stream. Posts reach the bot as
/// `channel_post` updates; subscribing checks that the public channel
/// resolves.
pub struct TelegramFeed {
    bot: Bot,
}

impl TelegramFeed {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChannelFeed for TelegramFeed {
    async fn subscribe(&self, channel: &ChannelId) -> Result<(), TransportError> {
        match self
            .bot
            .get_chat(Recipient::ChannelUsername(format!("@{channel}")))
            .await
        {
            Ok(_) => {
                debug!(channel = %channel, "Channel resolved");
                Ok(())
            }
            Err(RequestError::Api(ApiError::ChatNotFound)) => Err(TransportError::Message(
                format!("channel @{channel} does not exist or is private"),
            )),
            Err(source) => Err(TransportError::Resolve {
                channel: channel.clone(),
                source,
            }),
        }
    }

    async fn unsubscribe(&self, channel: &ChannelId) -> Result<(), TransportError> {
        debug!(channel = %channel, "Channel released");
        Ok(())
    }
}

/// Delivers alerts with `sendMessage`.
pub struct TelegramAlertSink {
    bot: Bot,
}

impl TelegramAlertSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn deliver(&self, recipient: i64, text: &str) -> Result<(), DeliveryError> {
        match self.bot.send_message(ChatId(recipient), text).await {
            Ok(_) => Ok(()),
            // Telegram answered but refused (blocked bot, unknown chat, ...)
            Err(RequestError::Api(e)) => Err(DeliveryError::Rejected(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessGuard, AdminId};
    use crate::registry::ChannelRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(json: &str) -> Message {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_split_short_message_untouched() {
        assert_eq!(split_message("hello", 4000), vec!["hello"]);
    }

    #[test]
    fn test_split_long_list_on_newlines() {
        let text: String = (0..50).map(|i| format!("  - @channel_{i:02}\n")).collect();
        let chunks = split_message(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert!(chunks.iter().all(|c| c.ends_with('\n')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_private_command_message() {
        let msg = message(
            r#"{
                "message_id": 11,
                "date": 1700000000,
                "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                "text": "/add_channel demo"
            }"#,
        );
        let inbound = inbound_from(&msg).unwrap();
        assert_eq!(inbound.sender_identity, 42);
        assert_eq!(inbound.chat_kind, ChatKind::Private);
        assert_eq!(inbound.arguments, vec!["demo"]);
        assert_eq!(inbound.message_id, Some(11));
    }

    #[test]
    fn test_anonymous_group_admin_uses_sender_chat() {
        let msg = message(
            r#"{
                "message_id": 12,
                "date": 1700000000,
                "chat": {"id": -1001601477384, "type": "supergroup", "title": "Ops"},
                "from": {
                    "id": 1087968824,
                    "is_bot": true,
                    "first_name": "Group",
                    "username": "GroupAnonymousBot"
                },
                "sender_chat": {"id": -1001601477384, "type": "supergroup", "title": "Ops"},
                "text": "/add_channel demo"
            }"#,
        );
        let inbound = inbound_from(&msg).unwrap();
        assert_eq!(inbound.sender_identity, -1001601477384);
        assert_eq!(inbound.chat_kind, ChatKind::Supergroup);

        let registry = ChannelRegistry::new();
        let router = CommandRouter::new(
            registry.clone(),
            AccessGuard::new(AdminId(-1001601477384)),
            false,
        );
        let reply = router.respond(&inbound).unwrap();
        assert!(reply.contains("added"), "{reply}");
        assert_eq!(registry.list(), vec![ChannelId::parse("demo").unwrap()]);
    }

    #[tokio::test]
    async fn test_shutdown_retries_until_dispatcher_accepts() {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let task = tokio::spawn(shutdown_when_cancelled(
            cancel.clone(),
            finished,
            move || {
                // Idle for the first two attempts, then running.
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    None
                } else {
                    Some(async {})
                }
            },
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_retrying_once_dispatcher_exits() {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let task = tokio::spawn(shutdown_when_cancelled(
            cancel.clone(),
            finished.clone(),
            || None::<std::future::Ready<()>>,
        ));

        cancel.cancel();
        tokio::time::sleep(SHUTDOWN_RETRY * 2).await;
        finished.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_channel_post_uses_chat_identity() {
        let msg = message(
            r#"{
                "message_id": 7,
                "date": 1700000000,
                "chat": {"id": -1001234, "type": "channel", "title": "Demo", "username": "Demo"},
                "text": "Stream #live now!"
            }"#,
        );
        let inbound = inbound_from(&msg).unwrap();
        assert_eq!(inbound.sender_identity, -1001234);
        assert_eq!(inbound.chat_kind, ChatKind::Channel);
        assert_eq!(inbound.chat_handle.as_deref(), Some("Demo"));
        assert_eq!(inbound.text, "Stream #live now!");
    }
}

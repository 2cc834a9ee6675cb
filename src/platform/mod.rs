pub mod telegram;

use std::fmt;

use async_trait::async_trait;

use crate::error::{DeliveryError, TransportError};
use crate::registry::ChannelId;

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatKind::Private => write!(f, "private"),
            ChatKind::Group => write!(f, "group"),
            ChatKind::Supergroup => write!(f, "supergroup"),
            ChatKind::Channel => write!(f, "channel"),
        }
    }
}

/// A message received from the transport, either a command or a channel post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sending user, or the chat itself for anonymous senders and channel posts
    pub sender_identity: i64,
    pub chat_identity: i64,
    pub chat_kind: ChatKind,
    /// Public handle of the chat, without `@`
    pub chat_handle: Option<String>,
    pub message_id: Option<i32>,
    pub text: String,
    /// Tokens after the leading `/command`; empty for plain text
    pub arguments: Vec<String>,
}

impl InboundMessage {
    pub fn new(
        sender_identity: i64,
        chat_identity: i64,
        chat_kind: ChatKind,
        chat_handle: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let arguments = parse_arguments(&text);
        Self {
            sender_identity,
            chat_identity,
            chat_kind,
            chat_handle,
            message_id: None,
            text,
            arguments,
        }
    }

    pub fn with_message_id(mut self, id: i32) -> Self {
        self.message_id = Some(id);
        self
    }
}

fn parse_arguments(text: &str) -> Vec<String> {
    let mut tokens = text.split_whitespace();
    match tokens.next() {
        Some(first) if first.starts_with('/') => tokens.map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Source of channel posts. Subscribing makes the watcher accept posts from
/// a channel.
#[async_trait]
pub trait ChannelFeed: Send + Sync {
    async fn subscribe(&self, channel: &ChannelId) -> Result<(), TransportError>;
    async fn unsubscribe(&self, channel: &ChannelId) -> Result<(), TransportError>;
}

/// Outbound delivery of alert text to a chat.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, recipient: i64, text: &str) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_follow_command_token() {
        let msg = InboundMessage::new(1, 1, ChatKind::Private, None, "/add_channel  demo extra");
        assert_eq!(msg.arguments, vec!["demo", "extra"]);
    }

    #[test]
    fn test_plain_text_has_no_arguments() {
        let msg = InboundMessage::new(1, 1, ChatKind::Private, None, "hello there");
        assert!(msg.arguments.is_empty());
        let bare = InboundMessage::new(1, 1, ChatKind::Private, None, "/list_channels");
        assert!(bare.arguments.is_empty());
    }

    #[test]
    fn test_chat_kind_display() {
        assert_eq!(ChatKind::Supergroup.to_string(), "supergroup");
        assert_eq!(ChatKind::Private.to_string(), "private");
    }
}

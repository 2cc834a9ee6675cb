use tracing::{info, warn};

use crate::access::AccessGuard;
use crate::error::CommandError;
use crate::platform::InboundMessage;
use crate::registry::{ChannelId, ChannelRegistry};

/// Command list shown by `/help` and registered with the bot.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Show your identity and chat type"),
    ("help", "List available commands"),
    ("add_channel", "Watch a channel: /add_channel <username>"),
    ("remove_channel", "Stop watching a channel: /remove_channel <username>"),
    ("list_channels", "Show watched channels"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command<'a> {
    Start,
    Help,
    AddChannel,
    RemoveChannel,
    ListChannels,
    Unknown(&'a str),
    /// `/name@otherbot` in a group with several bots
    ForOtherBot,
    Text,
}

impl<'a> Command<'a> {
    /// Parse the leading token, accepting the `/name@botname` form when the
    /// suffix names this bot.
    fn parse(text: &'a str, bot_username: Option<&str>) -> Self {
        let Some(head) = text.split_whitespace().next() else {
            return Command::Text;
        };
        let Some(name) = head.strip_prefix('/') else {
            return Command::Text;
        };
        let name = match name.split_once('@') {
            Some((name, target)) => match bot_username {
                Some(me) if !target.eq_ignore_ascii_case(me) => return Command::ForOtherBot,
                _ => name,
            },
            None => name,
        };
        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "add_channel" => Command::AddChannel,
            "remove_channel" => Command::RemoveChannel,
            "list_channels" => Command::ListChannels,
            other => Command::Unknown(other),
        }
    }
}

/// Maps administrator commands onto the channel registry.
pub struct CommandRouter {
    registry: ChannelRegistry,
    guard: AccessGuard,
    echo_unknown: bool,
    bot_username: Option<String>,
}

impl CommandRouter {
    pub fn new(registry: ChannelRegistry, guard: AccessGuard, echo_unknown: bool) -> Self {
        Self {
            registry,
            guard,
            echo_unknown,
            bot_username: None,
        }
    }

    /// Only answer `/name@botname` commands addressed to `username`.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Handle one message and produce the reply, if any. Command errors are
    /// turned into reply text here.
    pub fn respond(&self, msg: &InboundMessage) -> Option<String> {
        match self.route(msg) {
            Ok(reply) if reply.is_empty() => None,
            Ok(reply) => Some(reply),
            Err(e) => {
                if !matches!(e, CommandError::Unauthorized { .. }) {
                    info!(identity = msg.sender_identity, "Command rejected: {}", e);
                }
                Some(e.to_string())
            }
        }
    }

    /// Run a single command. An empty reply means "say nothing".
    pub fn route(&self, msg: &InboundMessage) -> Result<String, CommandError> {
        match Command::parse(&msg.text, self.bot_username.as_deref()) {
            Command::Start => Ok(format!(
                "Hello! I send an alert when a watched channel goes live.\n\n\
                 Your id: {}\nChat type: {}",
                msg.sender_identity, msg.chat_kind
            )),
            Command::Help => Ok(help_text()),
            Command::AddChannel => {
                self.guard.check(msg.sender_identity)?;
                let channel = single_channel_arg(msg, "add_channel")?;
                if self.registry.add(channel.clone()) {
                    info!(
                        channel = %channel,
                        watched = self.registry.len(),
                        "Channel added to watch list"
                    );
                    Ok(format!("Channel @{channel} added to the watch list."))
                } else {
                    Ok(format!("Channel @{channel} is already being watched."))
                }
            }
            Command::RemoveChannel => {
                self.guard.check(msg.sender_identity)?;
                let channel = single_channel_arg(msg, "remove_channel")?;
                self.registry.remove(&channel)?;
                info!(channel = %channel, "Channel removed from watch list");
                Ok(format!("Channel @{channel} removed from the watch list."))
            }
            Command::ListChannels => {
                self.guard.check(msg.sender_identity)?;
                let channels = self.registry.list();
                if channels.is_empty() {
                    return Ok("The watch list is empty.".to_string());
                }
                let mut reply = String::from("Watched channels:\n");
                for channel in &channels {
                    reply.push_str(&format!("  - @{}\n", channel));
                }
                Ok(reply)
            }
            Command::Unknown(name) => {
                warn!(identity = msg.sender_identity, "Unknown command: /{}", name);
                Ok(format!("Unknown command /{name}. Send /help for the list."))
            }
            Command::ForOtherBot => Ok(String::new()),
            Command::Text if self.echo_unknown => Ok(msg.text.clone()),
            Command::Text => Ok(String::new()),
        }
    }
}

fn single_channel_arg(
    msg: &InboundMessage,
    command: &'static str,
) -> Result<ChannelId, CommandError> {
    match msg.arguments.as_slice() {
        [arg] => ChannelId::parse(arg),
        _ => Err(CommandError::Usage { command }),
    }
}

fn help_text() -> String {
    let mut text = String::from("Commands:\n");
    for (name, description) in COMMANDS {
        text.push_str(&format!("/{} - {}\n", name, description));
    }
    text
}

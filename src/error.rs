use thiserror::Error;

use crate::registry::ChannelId;

/// Fatal problems found while loading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("setting {key} has invalid value {value:?}: {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Recoverable command failures. The `Display` text is what the user sees.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("You are not authorized to use this command.")]
    Unauthorized { identity: i64 },

    #[error("Usage: /{command} <channel_username>")]
    Usage { command: &'static str },

    #[error("Invalid channel username: {0:?}")]
    InvalidChannel(String),

    #[error("Channel @{0} is not in the watch list.")]
    NotFound(ChannelId),
}

/// An alert that could not be delivered. Alerts are never retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error("alert rejected: {0}")]
    Rejected(String),
}

/// Failure from the channel feed while (un)subscribing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve channel @{channel}: {source}")]
    Resolve {
        channel: ChannelId,
        #[source]
        source: teloxide::RequestError,
    },

    #[error("{0}")]
    Message(String),
}

/// Problems with an individual channel post. The watch loop logs and skips.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("malformed channel post in chat {chat}: {reason}")]
    Malformed { chat: i64, reason: &'static str },
}

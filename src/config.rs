use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::access::AdminId;
use crate::error::ConfigError;

/// Telegram credentials, all required, read from the environment.
#[derive(Debug)]
pub struct Credentials {
    /// User-session application id
    pub api_id: i32,
    /// User-session application hash, kept for a user-session channel feed
    #[allow(dead_code)]
    pub api_hash: SecretString,
    pub bot_token: SecretString,
    pub admin_chat_id: AdminId,
}

/// Optional settings, read from the TOML settings file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommandsConfig {
    /// Reply to free text with the same text (development aid)
    #[serde(default)]
    pub echo_unknown: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_resync_interval_secs() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    256
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl Config {
    /// Load settings from `path` and credentials from the process environment.
    ///
    /// A missing settings file is only an error when `required` is set (the
    /// path was given explicitly).
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let settings = Settings::load(path, required)?;
        Self::from_parts(settings, |key| std::env::var(key).ok())
    }

    /// Build from already-parsed settings and an environment lookup.
    pub fn from_parts<F>(mut settings: Settings, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials::from_lookup(&env)?;
        if let Some(port) = env("PORT") {
            settings.health.port = parse_var("PORT", port)?;
        }
        if settings.watcher.queue_capacity == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "watcher.queue_capacity",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if settings.watcher.resync_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "watcher.resync_interval_secs",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            credentials,
            settings,
        })
    }

    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.settings.health.bind, self.settings.health.port)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.settings.watcher.resync_interval_secs)
    }
}

impl Settings {
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() && !required {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl Credentials {
    pub fn from_lookup<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_id = parse_var("API_ID", require(&env, "API_ID")?)?;
        let api_hash = SecretString::new(require(&env, "API_HASH")?);
        let bot_token = SecretString::new(require(&env, "BOT_TOKEN")?);
        let admin_chat_id = AdminId(parse_var("ADMIN_CHAT_ID", require(&env, "ADMIN_CHAT_ID")?)?);
        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            admin_chat_id,
        })
    }
}

fn require<F>(env: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env(var) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parse_var<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

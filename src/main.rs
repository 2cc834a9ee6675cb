mod access;
mod alert;
mod commands;
mod config;
mod detector;
mod error;
mod health;
mod platform;
mod registry;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::access::AccessGuard;
use crate::alert::AlertDispatcher;
use crate::commands::CommandRouter;
use crate::config::Config;
use crate::platform::telegram::{self, TelegramAlertSink, TelegramFeed};
use crate::registry::ChannelRegistry;
use crate::watcher::ChannelWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Settings file is optional unless given explicitly
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let settings_path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration (settings: {})", settings_path.display());
    let config = Config::load(&settings_path, explicit.is_some())
        .context("Refusing to start with incomplete configuration")?;

    let admin = config.credentials.admin_chat_id;
    info!("Configuration loaded successfully");
    info!("  API id: {}", config.credentials.api_id);
    info!("  Admin chat: {}", admin.0);
    info!("  Liveness endpoint: {}", config.health_addr());
    info!("  Resync interval: {:?}", config.resync_interval());

    let bot = telegram::build_bot(&config.credentials.bot_token)?;
    let bot_username = telegram::connect(&bot).await?;

    let cancel = CancellationToken::new();
    let registry = ChannelRegistry::new();
    let (post_tx, post_rx) = mpsc::channel(config.settings.watcher.queue_capacity);

    let watcher = ChannelWatcher::new(
        registry.clone(),
        Arc::new(TelegramFeed::new(bot.clone())),
        AlertDispatcher::new(Arc::new(TelegramAlertSink::new(bot.clone()))),
        admin,
        config.resync_interval(),
    );
    let watcher_task = tokio::spawn(watcher.run(post_rx, cancel.clone()));

    let health_addr = config.health_addr();
    let health_cancel = cancel.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr, health_cancel).await {
            error!("Liveness endpoint failed: {:#}", e);
        }
    });

    let router = Arc::new(CommandRouter::new(
        registry,
        AccessGuard::new(admin),
        config.settings.commands.echo_unknown,
    )
    .with_bot_username(bot_username));
    let bot_task = tokio::spawn(telegram::run(bot, router, post_tx, cancel.clone()));

    info!("Relay is running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    cancel.cancel();

    match bot_task.await {
        Ok(Err(e)) => error!("Telegram dispatcher failed: {:#}", e),
        Err(e) => error!("Telegram dispatcher panicked: {}", e),
        Ok(Ok(())) => {}
    }
    if let Err(e) = watcher_task.await {
        error!("Channel watcher panicked: {}", e);
    }
    health_task.await.ok();

    info!("Stopped");
    Ok(())
}

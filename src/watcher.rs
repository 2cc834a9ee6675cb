use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access::AdminId;
use crate::alert::{format_alert, AlertDispatcher};
use crate::detector::StreamDetector;
use crate::error::WatchError;
use crate::platform::{ChannelFeed, InboundMessage};
use crate::registry::{ChannelId, ChannelRegistry};

/// What happened to a single channel post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The channel is not subscribed
    Ignored,
    NoSignal,
    Alerted,
    /// Live signal found but the alert could not be delivered
    AlertDropped,
}

/// Keeps channel subscriptions in line with the registry and turns live
/// posts into alerts.
pub struct ChannelWatcher {
    registry: ChannelRegistry,
    feed: Arc<dyn ChannelFeed>,
    dispatcher: AlertDispatcher,
    detector: StreamDetector,
    admin: AdminId,
    resync_interval: Duration,
    subscriptions: HashSet<ChannelId>,
}

impl ChannelWatcher {
    pub fn new(
        registry: ChannelRegistry,
        feed: Arc<dyn ChannelFeed>,
        dispatcher: AlertDispatcher,
        admin: AdminId,
        resync_interval: Duration,
    ) -> Self {
        Self {
            registry,
            feed,
            dispatcher,
            detector: StreamDetector,
            admin,
            resync_interval,
            subscriptions: HashSet::new(),
        }
    }

    #[cfg(test)]
    fn is_subscribed(&self, channel: &ChannelId) -> bool {
        self.subscriptions.contains(channel)
    }

    /// Bring subscriptions in line with the registry. Channels that fail to
    /// subscribe stay pending and are tried again on the next refresh.
    pub async fn refresh(&mut self) {
        if self.registry.is_empty() && self.subscriptions.is_empty() {
            return;
        }
        let wanted: HashSet<ChannelId> = self.registry.list().into_iter().collect();

        let stale: Vec<ChannelId> = self
            .subscriptions
            .difference(&wanted)
            .cloned()
            .collect();
        for channel in stale {
            if let Err(e) = self.feed.unsubscribe(&channel).await {
                warn!(channel = %channel, "Unsubscribe failed: {:#}", e);
            }
            self.subscriptions.remove(&channel);
            info!(channel = %channel, "Stopped watching channel");
        }

        let pending: Vec<ChannelId> = wanted
            .difference(&self.subscriptions)
            .cloned()
            .collect();
        for channel in pending {
            match self.feed.subscribe(&channel).await {
                Ok(()) => {
                    info!(channel = %channel, "Watching channel");
                    self.subscriptions.insert(channel);
                }
                Err(e) => {
                    warn!(channel = %channel, "Subscribe failed, will retry: {:#}", e);
                }
            }
        }
    }

    /// Refresh unless `cancel` fires first. Returns false when cancelled.
    async fn refresh_or_cancel(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.refresh() => true,
        }
    }

    /// Process one channel post.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<WatchOutcome, WatchError> {
        let handle = msg.chat_handle.as_deref().ok_or(WatchError::Malformed {
            chat: msg.chat_identity,
            reason: "channel has no public username",
        })?;
        let channel = ChannelId::parse(handle).map_err(|_| WatchError::Malformed {
            chat: msg.chat_identity,
            reason: "invalid channel username",
        })?;

        if !self.subscriptions.contains(&channel) {
            debug!(channel = %channel, "Post from unwatched channel");
            return Ok(WatchOutcome::Ignored);
        }

        if !self.detector.is_live_signal(&msg.text) {
            debug!(channel = %channel, "No live signal in post");
            return Ok(WatchOutcome::NoSignal);
        }

        info!(channel = %channel, "Live signal detected");
        let text = format_alert(&channel, msg.message_id);
        match self.dispatcher.notify(self.admin.0, &text).await {
            Ok(()) => Ok(WatchOutcome::Alerted),
            Err(_) => Ok(WatchOutcome::AlertDropped),
        }
    }

    /// Watch loop. Runs until `cancel` fires or the post queue closes.
    pub async fn run(mut self, mut posts: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        let mut changes = self.registry.subscribe();
        let mut resync = tokio::time::interval(self.resync_interval);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Channel watcher started");
        let mut running = self.refresh_or_cancel(&cancel).await;

        while running {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    running = self.refresh_or_cancel(&cancel).await;
                }
                _ = resync.tick() => {
                    running = self.refresh_or_cancel(&cancel).await;
                }
                post = posts.recv() => {
                    let Some(post) = post else { break };
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.handle(&post) => match result {
                            Ok(outcome) => debug!(?outcome, "Channel post handled"),
                            Err(e) => warn!("Skipping channel post: {}", e),
                        },
                    }
                }
            }
        }

        info!("Channel watcher stopped");
    }
}

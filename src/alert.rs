use std::sync::Arc;

use tracing::{error, info};

use crate::error::DeliveryError;
use crate::platform::AlertSink;
use crate::registry::ChannelId;

/// Build the alert text for a live post in `channel`.
pub fn format_alert(channel: &ChannelId, message_id: Option<i32>) -> String {
    match message_id {
        Some(id) => format!(
            "Stream started in channel @{channel}!\nhttps://t.me/{channel}/{id}"
        ),
        None => format!("Stream started in channel @{channel}!"),
    }
}

/// Sends alerts through an [`AlertSink`], logging failures at this boundary.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Deliver `text` to `recipient`. A failure is logged and returned as a
    /// value; the alert is not retried.
    pub async fn notify(&self, recipient: i64, text: &str) -> Result<(), DeliveryError> {
        match self.sink.deliver(recipient, text).await {
            Ok(()) => {
                info!(recipient, "Alert delivered");
                Ok(())
            }
            Err(e) => {
                error!(recipient, "Failed to deliver alert: {:#}", e);
                Err(e)
            }
        }
    }
}

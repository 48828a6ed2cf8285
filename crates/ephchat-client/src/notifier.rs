//! Outbound notification delivery.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use ephchat_shared::constants::{NOTIFICATION_ICON, NOTIFICATION_TAG};
use ephchat_shared::Message;

use crate::gate::preview;

/// A platform notification for one incoming message.
///
/// All notifications share one tag, so a newer one replaces the previous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    pub silent: bool,
    pub require_interaction: bool,
}

impl Notification {
    pub fn for_message(message: &Message) -> Self {
        Self {
            title: format!("New message from {}", message.sender_name),
            body: preview(&message.text),
            icon: NOTIFICATION_ICON.to_string(),
            tag: NOTIFICATION_TAG.to_string(),
            silent: false,
            require_interaction: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification receiver is gone")]
    Closed,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no platform backend exists.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = %notification.tag,
            "notification"
        );
        Ok(())
    }
}

/// Hands notifications to whoever holds the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| NotifyError::Closed)
    }
}

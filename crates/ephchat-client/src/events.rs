use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use ephchat_shared::{ConnectionState, Message, MessageId, ThreadId};

use crate::notifier::Notification;

/// Where the engine is with the active thread's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    /// No active thread.
    Idle,
    Subscribing,
    Synced,
    /// Re-establishing a subscription for the same thread; the view is kept.
    Resubscribing,
    /// The feed is down; waits for a reconnect.
    Unsubscribed,
}

/// Everything the engine reports to the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    MessageAdded { thread: ThreadId, message: Message },
    MessagesExpired { thread: ThreadId, ids: Vec<MessageId> },
    ActiveThreadChanged { thread: Option<ThreadId> },
    ThreadListChanged { threads: Vec<ThreadId> },
    SyncStateChanged { state: SyncState },
    ConnectionChanged { state: ConnectionState },
    NotificationDispatched { message_id: MessageId, notification: Notification },
}

pub fn emit_event(events: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!(?event, "event queue full, dropping event");
        }
        // Nobody is listening.
        Err(TrySendError::Closed(_)) => {}
    }
}

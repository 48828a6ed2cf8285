//! The store boundary the sync engine depends on.
//!
//! The log is addressed as `threads/{thread_id}/{message_id}`. Ids are
//! assigned by the store in insertion order; `time` is whatever the sender
//! put in the record.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ephchat_shared::{MessageId, MessageRecord, StoredMessage, ThreadId};

use crate::error::Result;

/// Append-only, per-thread message log with change subscriptions.
#[async_trait]
pub trait ThreadStore: Send + Sync + 'static {
    /// Append a record, creating the thread if needed. Returns the assigned id.
    async fn append(&self, thread: &ThreadId, record: MessageRecord) -> Result<MessageId>;

    /// Subscribe to a thread's records.
    ///
    /// Records already in the thread are replayed first, then every later
    /// append is delivered at least once, in arrival order. Redelivery is
    /// possible, so consumers dedupe by id. The stream ending means the
    /// channel went down.
    async fn subscribe_new_messages(&self, thread: &ThreadId) -> Result<Subscription<StoredMessage>>;

    /// Remove every record with `time <= now - retention window`.
    ///
    /// Best effort and not atomic across records. Returns how many were
    /// removed.
    async fn list_expired_and_delete(&self, thread: &ThreadId, now_millis: i64) -> Result<usize>;

    /// Remove a single record. Removing a missing record is not an error.
    async fn delete_message(&self, thread: &ThreadId, id: &MessageId) -> Result<()>;

    /// Remove a thread and all its records. Idempotent.
    async fn delete_thread(&self, thread: &ThreadId) -> Result<()>;

    /// Subscribe to the set of thread ids. The current set is delivered
    /// immediately, then again whenever it changes.
    async fn subscribe_thread_list(&self) -> Result<Subscription<Vec<ThreadId>>>;
}

/// Receiving end of a store subscription.
///
/// Dropping it unsubscribes: push-based stores notice the closed channel on
/// their next send, poll-based stores have their poller aborted.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    poller: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx, poller: None }
    }

    /// A subscription fed by a background task that dies with it.
    pub fn with_poller(rx: mpsc::UnboundedReceiver<T>, poller: JoinHandle<()>) -> Self {
        Self {
            rx,
            poller: Some(poller),
        }
    }

    /// Next delivery, or `None` once the store closed the feed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

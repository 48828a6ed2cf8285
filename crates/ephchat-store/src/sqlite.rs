//! SQLite-backed [`ThreadStore`].
//!
//! Subscriptions are fed by tokio tasks that poll the database, so appends
//! made by another process sharing the same file show up too. A poller that
//! hits a database error ends its feed, which subscribers read as the channel
//! going down.
//!
//! Every query runs on the blocking pool; a busy database never stalls a
//! runtime worker.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use ephchat_shared::constants::DEFAULT_POLL_INTERVAL;
use ephchat_shared::protocol::{message_path, thread_path};
use ephchat_shared::{MessageId, MessageRecord, RetentionPolicy, StoredMessage, ThreadId};

use crate::database::Database;
use crate::device::SqliteDeviceFlags;
use crate::error::{Result, StoreError};
use crate::messages::MessageBatch;
use crate::store::{Subscription, ThreadStore};

#[derive(Clone)]
pub struct SqliteThreadStore {
    db: Arc<Mutex<Database>>,
    policy: RetentionPolicy,
    poll_interval: Duration,
}

impl SqliteThreadStore {
    pub fn new(db: Database, poll_interval: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            policy: RetentionPolicy::default(),
            poll_interval,
        }
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, poll_interval: Duration) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?, poll_interval))
    }

    /// Private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, DEFAULT_POLL_INTERVAL))
    }

    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Device flags stored in the same database.
    pub fn device_flags(&self) -> SqliteDeviceFlags {
        SqliteDeviceFlags::new(self.db.clone())
    }

    /// Run `op` against the database on the blocking pool.
    async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            op(&guard)
        })
        .await?
    }

    async fn poll_messages(&self, thread: &ThreadId, after_seq: u64) -> Result<MessageBatch> {
        let thread = thread.clone();
        self.with_db(move |db| db.messages_after(&thread, after_seq))
            .await
    }

    async fn poll_thread_ids(&self) -> Result<Vec<ThreadId>> {
        self.with_db(|db| db.list_thread_ids()).await
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Push a batch into the feed and return where the next poll starts;
/// `None` once the subscriber went away.
fn forward(tx: &mpsc::UnboundedSender<StoredMessage>, batch: MessageBatch) -> Option<u64> {
    for msg in batch.messages {
        tx.send(msg).ok()?;
    }
    Some(batch.last_seq)
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn append(&self, thread: &ThreadId, record: MessageRecord) -> Result<MessageId> {
        let target = thread.clone();
        let id = self
            .with_db(move |db| db.insert_message(&target, &record))
            .await?;
        debug!(path = %thread_path(thread), id = %id, "record appended");
        Ok(id)
    }

    async fn subscribe_new_messages(&self, thread: &ThreadId) -> Result<Subscription<StoredMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Read the backlog up front so a broken database fails the call.
        let backlog = self.poll_messages(thread, 0).await?;
        let Some(last_seen) = forward(&tx, backlog) else {
            return Ok(Subscription::new(rx));
        };

        debug!(path = %thread_path(thread), last_seen, "message feed started");

        let store = self.clone();
        let thread = thread.clone();
        let poller = tokio::spawn(async move {
            let mut last_seen = last_seen;
            let mut ticker = store.ticker();
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    return;
                }
                let batch = match store.poll_messages(&thread, last_seen).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(path = %thread_path(&thread), error = %e, "message poll failed, closing feed");
                        return;
                    }
                };
                match forward(&tx, batch) {
                    Some(seen) => last_seen = seen,
                    None => return,
                }
            }
        });

        Ok(Subscription::with_poller(rx, poller))
    }

    async fn list_expired_and_delete(&self, thread: &ThreadId, now_millis: i64) -> Result<usize> {
        let cutoff = self.policy.cutoff(now_millis);
        let target = thread.clone();
        let removed = self
            .with_db(move |db| db.delete_messages_up_to(&target, cutoff))
            .await?;
        if removed > 0 {
            info!(path = %thread_path(thread), removed, "expired records swept");
        }
        Ok(removed)
    }

    async fn delete_message(&self, thread: &ThreadId, id: &MessageId) -> Result<()> {
        let (target, key) = (thread.clone(), id.clone());
        let removed = self
            .with_db(move |db| db.delete_message(&target, &key))
            .await?;
        if removed {
            debug!(path = %message_path(thread, id), "record deleted");
        }
        Ok(())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<()> {
        let target = thread.clone();
        let removed = self.with_db(move |db| db.delete_thread(&target)).await?;
        info!(path = %thread_path(thread), removed, "thread deleted");
        Ok(())
    }

    async fn subscribe_thread_list(&self) -> Result<Subscription<Vec<ThreadId>>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let current = self.poll_thread_ids().await?;
        if tx.send(current.clone()).is_err() {
            return Ok(Subscription::new(rx));
        }

        let store = self.clone();
        let poller = tokio::spawn(async move {
            let mut last = current;
            let mut ticker = store.ticker();
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    return;
                }
                let ids = match store.poll_thread_ids().await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(error = %e, "thread list poll failed, closing feed");
                        return;
                    }
                };
                if ids != last {
                    if tx.send(ids.clone()).is_err() {
                        return;
                    }
                    last = ids;
                }
            }
        });

        Ok(Subscription::with_poller(rx, poller))
    }
}

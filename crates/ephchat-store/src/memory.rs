//! In-process [`ThreadStore`] with push delivery.
//!
//! Appends are fanned out to subscribers synchronously. Setting the store
//! offline makes every call fail with [`StoreError::Unavailable`] and closes
//! all live feeds, which is how tests exercise the disconnected paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use ephchat_shared::protocol::{message_path, thread_path};
use ephchat_shared::{MessageId, MessageRecord, RetentionPolicy, StoredMessage, ThreadId};

use crate::error::{Result, StoreError};
use crate::store::{Subscription, ThreadStore};

#[derive(Debug)]
struct ThreadLog {
    id: ThreadId,
    messages: Vec<StoredMessage>,
}

#[derive(Debug)]
struct Inner {
    online: bool,
    next_seq: u64,
    /// Creation order.
    threads: Vec<ThreadLog>,
    message_subs: HashMap<ThreadId, Vec<mpsc::UnboundedSender<StoredMessage>>>,
    list_subs: Vec<mpsc::UnboundedSender<Vec<ThreadId>>>,
}

impl Inner {
    fn ensure_online(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn position(&self, thread: &ThreadId) -> Option<usize> {
        self.threads.iter().position(|t| &t.id == thread)
    }

    fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|t| t.id.clone()).collect()
    }

    fn publish_thread_list(&mut self) {
        let ids = self.thread_ids();
        self.list_subs.retain(|tx| tx.send(ids.clone()).is_ok());
    }

    /// Drop a thread whose last record is gone.
    fn prune_if_empty(&mut self, idx: usize) {
        if self.threads[idx].messages.is_empty() {
            let log = self.threads.remove(idx);
            debug!(path = %thread_path(&log.id), "thread emptied");
            self.publish_thread_list();
        }
    }
}

/// Clonable handle; clones share the same log.
#[derive(Debug, Clone)]
pub struct MemoryThreadStore {
    inner: Arc<Mutex<Inner>>,
    policy: RetentionPolicy,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::with_policy(RetentionPolicy::default())
    }

    pub fn with_policy(policy: RetentionPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                online: true,
                next_seq: 0,
                threads: Vec::new(),
                message_subs: HashMap::new(),
                list_subs: Vec::new(),
            })),
            policy,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Simulate the channel going down or coming back.
    ///
    /// Going offline closes every live subscription.
    pub fn set_online(&self, online: bool) -> Result<()> {
        let mut inner = self.lock()?;
        inner.online = online;
        if !online {
            inner.message_subs.clear();
            inner.list_subs.clear();
        }
        debug!(online, "memory store availability changed");
        Ok(())
    }

    /// Snapshot of the thread ids in creation order.
    pub fn thread_ids(&self) -> Result<Vec<ThreadId>> {
        Ok(self.lock()?.thread_ids())
    }

    /// Snapshot of a thread's records in arrival order.
    pub fn messages(&self, thread: &ThreadId) -> Result<Vec<StoredMessage>> {
        let inner = self.lock()?;
        Ok(inner
            .position(thread)
            .map(|idx| inner.threads[idx].messages.clone())
            .unwrap_or_default())
    }

    /// Deliver an already stored record again to the thread's subscribers,
    /// as a reconnecting channel would.
    pub fn redeliver(&self, thread: &ThreadId, id: &MessageId) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(msg) = inner.position(thread).and_then(|idx| {
            inner.threads[idx]
                .messages
                .iter()
                .find(|m| &m.id == id)
                .cloned()
        }) else {
            return Ok(false);
        };
        if let Some(subs) = inner.message_subs.get_mut(thread) {
            subs.retain(|tx| tx.send(msg.clone()).is_ok());
        }
        Ok(true)
    }
}

impl Default for MemoryThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn append(&self, thread: &ThreadId, record: MessageRecord) -> Result<MessageId> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        inner.next_seq += 1;
        let id = MessageId::from_seq(inner.next_seq);
        let stored = StoredMessage {
            id: id.clone(),
            record,
        };

        let created = match inner.position(thread) {
            Some(idx) => {
                inner.threads[idx].messages.push(stored.clone());
                false
            }
            None => {
                inner.threads.push(ThreadLog {
                    id: thread.clone(),
                    messages: vec![stored.clone()],
                });
                true
            }
        };

        if let Some(subs) = inner.message_subs.get_mut(thread) {
            subs.retain(|tx| tx.send(stored.clone()).is_ok());
        }
        if created {
            debug!(path = %thread_path(thread), "thread created");
            inner.publish_thread_list();
        }

        Ok(id)
    }

    async fn subscribe_new_messages(&self, thread: &ThreadId) -> Result<Subscription<StoredMessage>> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(idx) = inner.position(thread) {
            for msg in &inner.threads[idx].messages {
                // The receiver is still in our hands, this cannot fail.
                let _ = tx.send(msg.clone());
            }
        }
        inner
            .message_subs
            .entry(thread.clone())
            .or_default()
            .push(tx);

        Ok(Subscription::new(rx))
    }

    async fn list_expired_and_delete(&self, thread: &ThreadId, now_millis: i64) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        let Some(idx) = inner.position(thread) else {
            return Ok(0);
        };
        let cutoff = self.policy.cutoff(now_millis);
        let log = &mut inner.threads[idx];
        let before = log.messages.len();
        log.messages.retain(|m| m.record.time > cutoff);
        let removed = before - log.messages.len();

        inner.prune_if_empty(idx);
        Ok(removed)
    }

    async fn delete_message(&self, thread: &ThreadId, id: &MessageId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        if let Some(idx) = inner.position(thread) {
            inner.threads[idx].messages.retain(|m| &m.id != id);
            debug!(path = %message_path(thread, id), "record deleted");
            inner.prune_if_empty(idx);
        }
        Ok(())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        if let Some(idx) = inner.position(thread) {
            inner.threads.remove(idx);
            debug!(path = %thread_path(thread), "thread deleted");
            inner.publish_thread_list();
        }
        Ok(())
    }

    async fn subscribe_thread_list(&self) -> Result<Subscription<Vec<ThreadId>>> {
        let mut inner = self.lock()?;
        inner.ensure_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.thread_ids());
        inner.list_subs.push(tx);
        Ok(Subscription::new(rx))
    }
}

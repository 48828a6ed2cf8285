//! The ordered local view of the active thread.
//!
//! Messages are kept in a `BTreeMap` keyed by `(sent_at_millis, arrival)` so
//! iteration is always in non-decreasing send time with ties in arrival
//! order. A parallel id index makes duplicate checks O(1).

use std::collections::{BTreeMap, HashMap};

use ephchat_shared::{Message, MessageId, RetentionPolicy};

type SortKey = (i64, u64);

#[derive(Debug, Default)]
pub struct MessageView {
    ordered: BTreeMap<SortKey, Message>,
    index: HashMap<MessageId, SortKey>,
    next_arrival: u64,
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    /// Insert a message. Returns `false` (and changes nothing) if its id is
    /// already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            return false;
        }
        let key = (message.sent_at_millis, self.next_arrival);
        self.next_arrival += 1;
        self.index.insert(message.id.clone(), key);
        self.ordered.insert(key, message);
        true
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let key = self.index.remove(id)?;
        self.ordered.remove(&key)
    }

    /// Drop every message expired at `now_millis`; returns their ids.
    pub fn evict_expired(&mut self, policy: &RetentionPolicy, now_millis: i64) -> Vec<MessageId> {
        let expired = policy.sweep_candidates(self.ordered.values(), now_millis);
        let mut removed: Vec<MessageId> = expired
            .into_iter()
            .filter(|id| self.remove(id).is_some())
            .collect();
        removed.sort();
        removed
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.ordered.values()
    }

    /// Ordered copy of the messages still inside the retention window.
    pub fn snapshot(&self, policy: &RetentionPolicy, now_millis: i64) -> Vec<Message> {
        self.iter()
            .filter(|m| !policy.is_expired(m, now_millis))
            .cloned()
            .collect()
    }
}

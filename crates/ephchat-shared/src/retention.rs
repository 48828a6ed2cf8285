//! Time-based retention.
//!
//! A message is expired once `now - sent_at >= window`. The check is pure:
//! callers pass `now` explicitly so the live-view path and the store sweep
//! agree on the same predicate.

use std::collections::HashSet;
use std::time::Duration;

use crate::constants::RETENTION_WINDOW;
use crate::types::{Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window_millis: i64,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self {
            window_millis: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn window_millis(&self) -> i64 {
        self.window_millis
    }

    /// Records with `time <= cutoff(now)` are expired.
    pub fn cutoff(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.window_millis)
    }

    pub fn is_expired(&self, message: &Message, now_millis: i64) -> bool {
        self.is_expired_at(message.sent_at_millis, now_millis)
    }

    pub fn is_expired_at(&self, sent_at_millis: i64, now_millis: i64) -> bool {
        now_millis.saturating_sub(sent_at_millis) >= self.window_millis
    }

    /// Ids of every message in `snapshot` that has expired at `now_millis`.
    pub fn sweep_candidates<'a, I>(&self, snapshot: I, now_millis: i64) -> HashSet<MessageId>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        snapshot
            .into_iter()
            .filter(|m| self.is_expired(m, now_millis))
            .map(|m| m.id.clone())
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(RETENTION_WINDOW)
    }
}

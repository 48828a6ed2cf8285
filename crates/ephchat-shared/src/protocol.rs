use serde::{Deserialize, Serialize};

use crate::constants::THREADS_ROOT;
use crate::types::{MessageId, ThreadId};

/// Stored form of a message at `threads/{thread_id}/{message_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Sender display name
    pub name: String,
    pub text: String,
    /// Send time, epoch millis
    pub time: i64,
}

impl MessageRecord {
    pub fn new(name: impl Into<String>, text: impl Into<String>, time: i64) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            time,
        }
    }
}

/// A record together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub record: MessageRecord,
}

/// Key of a thread in the keyed log.
pub fn thread_path(thread: &ThreadId) -> String {
    format!("{THREADS_ROOT}/{thread}")
}

/// Key of a single record in the keyed log.
pub fn message_path(thread: &ThreadId, id: &MessageId) -> String {
    format!("{THREADS_ROOT}/{thread}/{id}")
}

use serde::{Deserialize, Serialize};

use crate::naming;
use crate::protocol::MessageRecord;

/// Normalized thread name, e.g. `jan_novak`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Derive the thread a user with this display name lands in.
    pub fn from_display_name(name: &str) -> Self {
        Self(naming::display_name_to_thread_id(name))
    }

    /// Wrap an id exactly as the store reports it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable label, `jan_novak` -> `Jan Novak`.
    pub fn display_label(&self) -> String {
        naming::thread_id_to_display_label(&self.0)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned message id. Opaque to the engine, but the bundled stores
/// hand out zero-padded sequence numbers so that string order is arrival
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_seq(seq: u64) -> Self {
        Self(format!("{seq:020}"))
    }

    /// Inverse of [`MessageId::from_seq`]; `None` for foreign ids.
    pub fn seq(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_name: String,
    pub text: String,
    /// Set by the sender at send time (epoch millis), never by the store.
    pub sent_at_millis: i64,
    /// `sender_name` equals the configured admin identity.
    pub is_from_admin: bool,
}

impl Message {
    pub fn from_record(id: MessageId, record: MessageRecord, admin_name: &str) -> Self {
        let is_from_admin = record.name == admin_name;
        Self {
            id,
            sender_name: record.name,
            text: record.text,
            sent_at_millis: record.time,
            is_from_admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Granted,
    Denied,
    NotYetAsked,
}

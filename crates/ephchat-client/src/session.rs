//! Per-login session state.

use serde::Serialize;

use ephchat_shared::{ConnectionState, Role, ThreadId};

use crate::error::{ChatError, Result};

/// Who is logged in, where messages go, and whether the store is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub display_name: String,
    pub role: Role,
    /// For a user session this is fixed to their own thread. For an admin
    /// it is whatever the admin selected, if anything.
    pub active_thread: Option<ThreadId>,
    pub connection: ConnectionState,
}

impl ChatSession {
    /// Start a session. A user is bound to the thread derived from their
    /// name; an admin starts with no thread.
    pub fn new(display_name: &str, role: Role) -> Self {
        let display_name = display_name.trim().to_string();
        let active_thread = match role {
            Role::User => Some(ThreadId::from_display_name(&display_name)),
            Role::Admin => None,
        };
        Self {
            display_name,
            role,
            active_thread,
            connection: ConnectionState::Connected,
        }
    }

    /// Role by name: whoever logs in under the admin name is the admin.
    pub fn for_identity(display_name: &str, admin_name: &str) -> Self {
        let role = if display_name.trim() == admin_name {
            Role::Admin
        } else {
            Role::User
        };
        Self::new(display_name, role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The thread a send goes to right now.
    pub fn send_destination(&self) -> Result<ThreadId> {
        match (&self.role, &self.active_thread) {
            (_, Some(thread)) => Ok(thread.clone()),
            (Role::User, None) => Ok(ThreadId::from_display_name(&self.display_name)),
            (Role::Admin, None) => Err(ChatError::ThreadNotSelected),
        }
    }
}

use thiserror::Error;

use ephchat_store::StoreError;

/// Errors surfaced to callers of the sync engine.
///
/// `PermissionDenied` is deliberately absent: a denied notification
/// permission only switches the notify path off.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    /// Admin tried to send with no active thread. Rejected before any
    /// store call.
    #[error("No thread selected")]
    ThreadNotSelected,

    #[error("Only the administrator can do this")]
    AdminOnly,

    /// Append rejected. Nothing was added locally; the user may resend.
    #[error("Message could not be sent: {0}")]
    SendFailed(#[source] StoreError),

    /// The log channel cannot be reached; the session is now disconnected.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// Confirmation for a delete request this engine never issued, or
    /// already consumed.
    #[error("Delete request is unknown or already used")]
    StaleDeleteRequest,

    #[error("Sync engine has stopped")]
    EngineStopped,
}

impl ChatError {
    /// Whether retrying the same action later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::SendFailed(_) | ChatError::StoreUnavailable(_))
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        if e.is_unavailable() {
            ChatError::StoreUnavailable(e)
        } else {
            ChatError::Store(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use ephchat_shared::{Message, MessageId, PermissionState, ThreadId};

use crate::eligibility::NotificationEligibility;
use crate::error::{ChatError, Result};
use crate::events::SyncState;
use crate::session::ChatSession;

use super::worker::Input;

/// Caller requests, answered on the oneshot where one is present.
pub(crate) enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    SelectThread {
        thread: ThreadId,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestDelete {
        thread: ThreadId,
        reply: oneshot::Sender<Result<DeleteRequest>>,
    },
    ConfirmDelete {
        request: DeleteRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelDelete {
        id: Uuid,
    },
    Messages {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    SetAppVisible {
        visible: bool,
    },
    SetPermission {
        permission: PermissionState,
        reply: oneshot::Sender<Result<()>>,
    },
    ResetDevice {
        reply: oneshot::Sender<Result<()>>,
    },
    SweepNow {
        reply: oneshot::Sender<Result<usize>>,
    },
    Reconnect,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// First half of a thread deletion. Nothing is removed until the request
/// is handed back to [`EngineHandle::confirm_delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    id: Uuid,
    thread: ThreadId,
}

impl DeleteRequest {
    pub(crate) fn new(thread: ThreadId) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn thread(&self) -> &ThreadId {
        &self.thread
    }

    /// Human-readable name for the confirmation prompt.
    pub fn label(&self) -> String {
        self.thread.display_label()
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub session: ChatSession,
    pub sync_state: SyncState,
    pub eligibility: NotificationEligibility,
    pub app_visible: bool,
    pub threads: Vec<ThreadId>,
}

/// Cloneable front end to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { tx }
    }

    fn post(&self, command: Command) -> Result<()> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| ChatError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.post(build(reply))?;
        rx.await.map_err(|_| ChatError::EngineStopped)
    }

    /// Append a message to the current destination thread.
    ///
    /// The message shows up in the view when the store delivers it back,
    /// not before.
    pub async fn send(&self, text: impl Into<String>) -> Result<MessageId> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await?
    }

    /// Admin only. Switches the active thread.
    pub async fn select_thread(&self, thread: ThreadId) -> Result<()> {
        self.request(|reply| Command::SelectThread { thread, reply })
            .await?
    }

    /// Admin only. Never destructive.
    pub async fn request_delete(&self, thread: ThreadId) -> Result<DeleteRequest> {
        self.request(|reply| Command::RequestDelete { thread, reply })
            .await?
    }

    pub async fn confirm_delete(&self, request: DeleteRequest) -> Result<()> {
        self.request(|reply| Command::ConfirmDelete { request, reply })
            .await?
    }

    pub fn cancel_delete(&self, request: DeleteRequest) -> Result<()> {
        self.post(Command::CancelDelete { id: request.id })
    }

    /// The active thread's messages in display order, expired ones left out.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.request(|reply| Command::Messages { reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub fn set_app_visible(&self, visible: bool) -> Result<()> {
        self.post(Command::SetAppVisible { visible })
    }

    pub async fn set_permission(&self, permission: PermissionState) -> Result<()> {
        self.request(|reply| Command::SetPermission { permission, reply })
            .await?
    }

    pub async fn reset_device(&self) -> Result<()> {
        self.request(|reply| Command::ResetDevice { reply }).await?
    }

    /// Run one sweep of the active thread now. Returns how many records the
    /// store removed.
    pub async fn sweep_now(&self) -> Result<usize> {
        self.request(|reply| Command::SweepNow { reply }).await?
    }

    /// Re-subscribe after the feed went down. The view is kept.
    pub fn reconnect(&self) -> Result<()> {
        self.post(Command::Reconnect)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

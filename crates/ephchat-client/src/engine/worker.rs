use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ephchat_shared::{
    Clock, ConnectionState, Message, MessageId, MessageRecord, StoredMessage, ThreadId,
};
use ephchat_store::{StoreError, ThreadStore};

use crate::config::EngineConfig;
use crate::eligibility::EligibilityTracker;
use crate::error::{ChatError, Result};
use crate::events::{emit_event, EngineEvent, SyncState};
use crate::gate;
use crate::notifier::{Notification, Notifier};
use crate::roster::ThreadRoster;
use crate::session::ChatSession;
use crate::view::MessageView;

use super::handle::{Command, DeleteRequest, EngineStatus};
use super::{EngineDeps, Inbox, TaskGuard};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything the engine task reacts to.
pub(crate) enum Input {
    Command(Command),
    /// Outcome of subscribing to the active thread.
    Subscribed {
        generation: u64,
        result: StoreResult<()>,
    },
    Delivered {
        generation: u64,
        message: StoredMessage,
    },
    /// The message feed ended: the channel went down.
    FeedClosed {
        generation: u64,
    },
    ThreadList {
        generation: u64,
        threads: Vec<ThreadId>,
    },
    ThreadListClosed {
        generation: u64,
        error: Option<StoreError>,
    },
    Swept {
        generation: u64,
        result: StoreResult<usize>,
        reply: Option<oneshot::Sender<Result<usize>>>,
    },
    /// A fire-and-forget store call finished.
    StoreCallDone {
        reachable: bool,
    },
    ThreadDeleted {
        thread: ThreadId,
        result: StoreResult<()>,
        reply: oneshot::Sender<Result<()>>,
    },
}

fn reachable<T>(result: &StoreResult<T>) -> bool {
    !matches!(result, Err(e) if e.is_unavailable())
}

async fn sweep_once<S: ThreadStore>(
    store: &S,
    thread: &ThreadId,
    now_millis: i64,
) -> StoreResult<usize> {
    let result = store.list_expired_and_delete(thread, now_millis).await;
    if let Err(e) = &result {
        warn!(thread = %thread, error = %e, "sweep failed, will retry next cycle");
    }
    result
}

pub(crate) struct Worker<S: ThreadStore> {
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    eligibility: EligibilityTracker,
    pub(crate) session: ChatSession,
    pub(crate) view: MessageView,
    roster: ThreadRoster,
    pub(crate) sync_state: SyncState,
    app_visible: bool,

    /// Bumped on every (re)subscription; deliveries tagged with an older
    /// value are dropped.
    pub(crate) generation: u64,
    feed: Option<TaskGuard>,
    sweeper: Option<TaskGuard>,

    roster_generation: u64,
    roster_feed: Option<TaskGuard>,

    pending_deletes: HashMap<Uuid, ThreadId>,

    /// Ids that already went through the notification gate, per thread, with
    /// their send time. Survives thread switches so replays stay silent.
    notified: HashMap<ThreadId, HashMap<MessageId, i64>>,

    inbox: Inbox,
    events: mpsc::Sender<EngineEvent>,
}

impl<S: ThreadStore> Worker<S> {
    pub(crate) fn new(
        store: Arc<S>,
        session: ChatSession,
        deps: EngineDeps,
        config: EngineConfig,
        inbox: Inbox,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let eligibility = EligibilityTracker::start(deps.device, session.role);
        Self {
            store,
            config,
            clock: deps.clock,
            notifier: deps.notifier,
            eligibility,
            session,
            view: MessageView::new(),
            roster: ThreadRoster::new(),
            sync_state: SyncState::Idle,
            app_visible: true,
            generation: 0,
            feed: None,
            sweeper: None,
            roster_generation: 0,
            roster_feed: None,
            pending_deletes: HashMap::new(),
            notified: HashMap::new(),
            inbox,
            events,
        }
    }

    pub(crate) async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input>) {
        info!(
            name = %self.session.display_name,
            role = ?self.session.role,
            "sync engine started"
        );

        self.start();
        while let Some(input) = input_rx.recv().await {
            if !self.handle_input(input) {
                break;
            }
        }
        self.stop();

        info!("sync engine stopped");
    }

    fn start(&mut self) {
        if self.session.is_admin() {
            self.start_roster_feed();
        }
        if let Some(thread) = self.session.active_thread.clone() {
            self.activate(thread, false);
        }
    }

    fn stop(&mut self) {
        self.release_feed();
        self.roster_feed = None;
        self.set_sync_state(SyncState::Unsubscribed);
    }

    /// Returns `false` when the engine should stop.
    pub(crate) fn handle_input(&mut self, input: Input) -> bool {
        match input {
            Input::Command(command) => return self.handle_command(command),
            Input::Subscribed { generation, result } => self.on_subscribed(generation, result),
            Input::Delivered { generation, message } => self.on_delivered(generation, message),
            Input::FeedClosed { generation } => self.on_feed_closed(generation),
            Input::ThreadList {
                generation,
                threads,
            } => self.on_thread_list(generation, threads),
            Input::ThreadListClosed { generation, error } => {
                self.on_thread_list_closed(generation, error)
            }
            Input::Swept {
                generation,
                result,
                reply,
            } => self.on_swept(generation, result, reply),
            Input::StoreCallDone { reachable } => self.set_connection(reachable),
            Input::ThreadDeleted {
                thread,
                result,
                reply,
            } => self.on_thread_deleted(thread, result, reply),
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Send { text, reply } => self.send_message(text, reply),
            Command::SelectThread { thread, reply } => {
                let _ = reply.send(self.select_thread(thread));
            }
            Command::RequestDelete { thread, reply } => {
                let _ = reply.send(self.request_delete(thread));
            }
            Command::ConfirmDelete { request, reply } => self.confirm_delete(request, reply),
            Command::CancelDelete { id } => {
                if self.pending_deletes.remove(&id).is_some() {
                    debug!(%id, "delete request cancelled");
                }
            }
            Command::Messages { reply } => {
                let now = self.clock.now_millis();
                let _ = reply.send(self.view.snapshot(&self.config.retention, now));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::SetAppVisible { visible } => {
                debug!(visible, "app visibility changed");
                self.app_visible = visible;
            }
            Command::SetPermission { permission, reply } => {
                let _ = reply.send(self.eligibility.set_permission(permission));
            }
            Command::ResetDevice { reply } => {
                let _ = reply.send(self.eligibility.reset());
            }
            Command::SweepNow { reply } => self.sweep_now(reply),
            Command::Reconnect => self.reconnect(),
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            session: self.session.clone(),
            sync_state: self.sync_state,
            eligibility: self.eligibility.snapshot(),
            app_visible: self.app_visible,
            threads: self.roster.threads().to_vec(),
        }
    }

    // ------------------------------------------------------------------
    // Active thread
    // ------------------------------------------------------------------

    /// Subscribe to `thread` and start its sweep timer.
    ///
    /// With `resubscribe` the thread stays the same and the view is kept;
    /// replayed records are absorbed by the id merge.
    fn activate(&mut self, thread: ThreadId, resubscribe: bool) {
        self.release_feed();
        self.generation += 1;
        let generation = self.generation;

        if !resubscribe {
            self.view.clear();
            self.session.active_thread = Some(thread.clone());
            self.emit(EngineEvent::ActiveThreadChanged {
                thread: Some(thread.clone()),
            });
        }
        self.set_sync_state(if resubscribe {
            SyncState::Resubscribing
        } else {
            SyncState::Subscribing
        });

        let store = self.store.clone();
        let inbox = self.inbox.clone();
        let feed_thread = thread.clone();
        self.feed = Some(TaskGuard::spawn(async move {
            let mut subscription = match store.subscribe_new_messages(&feed_thread).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    inbox.post(Input::Subscribed {
                        generation,
                        result: Err(e),
                    });
                    return;
                }
            };
            if !inbox.post(Input::Subscribed {
                generation,
                result: Ok(()),
            }) {
                return;
            }
            while let Some(message) = subscription.recv().await {
                if !inbox.post(Input::Delivered {
                    generation,
                    message,
                }) {
                    return;
                }
            }
            inbox.post(Input::FeedClosed { generation });
        }));

        self.sweeper = Some(self.spawn_sweeper(thread, generation));
    }

    /// Drop the active thread entirely.
    fn deactivate(&mut self) {
        self.release_feed();
        self.generation += 1;
        self.view.clear();
        self.session.active_thread = None;
        self.emit(EngineEvent::ActiveThreadChanged { thread: None });
        self.set_sync_state(SyncState::Idle);
    }

    fn release_feed(&mut self) {
        self.feed = None;
        self.sweeper = None;
    }

    fn spawn_sweeper(&self, thread: ThreadId, generation: u64) -> TaskGuard {
        let store = self.store.clone();
        let inbox = self.inbox.clone();
        let clock = self.clock.clone();
        let period = self.config.sweep_interval.max(Duration::from_millis(1));

        TaskGuard::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = sweep_once(&*store, &thread, clock.now_millis()).await;
                if !inbox.post(Input::Swept {
                    generation,
                    result,
                    reply: None,
                }) {
                    return;
                }
            }
        })
    }

    fn on_subscribed(&mut self, generation: u64, result: StoreResult<()>) {
        if generation != self.generation {
            debug!(generation, "stale subscribe result dropped");
            return;
        }
        match result {
            Ok(()) => {
                self.set_connection(true);
                self.set_sync_state(SyncState::Synced);
            }
            Err(e) => {
                warn!(error = %e, "subscribe failed, waiting for reconnect");
                self.feed = None;
                self.set_connection(!e.is_unavailable());
                self.set_sync_state(SyncState::Unsubscribed);
            }
        }
    }

    fn on_feed_closed(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        warn!("message feed closed, waiting for reconnect");
        self.feed = None;
        self.set_connection(false);
        self.set_sync_state(SyncState::Unsubscribed);
    }

    fn on_delivered(&mut self, generation: u64, stored: StoredMessage) {
        if generation != self.generation {
            debug!(id = %stored.id, generation, "stale delivery dropped");
            return;
        }
        let Some(thread) = self.session.active_thread.clone() else {
            return;
        };

        let message = Message::from_record(stored.id, stored.record, &self.config.admin_name);
        if self.view.contains(&message.id) {
            return;
        }

        if self
            .config
            .retention
            .is_expired(&message, self.clock.now_millis())
        {
            debug!(id = %message.id, "record expired on arrival, removing");
            self.spawn_delete_message(thread, message.id);
            return;
        }

        self.view.insert(message.clone());
        if self.mark_notified(&thread, &message) {
            self.maybe_notify(&message);
        }
        self.emit(EngineEvent::MessageAdded { thread, message });
    }

    /// Returns `false` if `message` was gated before in this session.
    fn mark_notified(&mut self, thread: &ThreadId, message: &Message) -> bool {
        self.notified
            .entry(thread.clone())
            .or_default()
            .insert(message.id.clone(), message.sent_at_millis)
            .is_none()
    }

    #[cfg(test)]
    pub(crate) fn has_notified(&self, thread: &ThreadId, id: &MessageId) -> bool {
        self.notified
            .get(thread)
            .is_some_and(|ids| ids.contains_key(id))
    }

    fn forget_expired_notified(&mut self, now_millis: i64) {
        let retention = self.config.retention;
        self.notified.retain(|_, ids| {
            ids.retain(|_, sent_at| !retention.is_expired_at(*sent_at, now_millis));
            !ids.is_empty()
        });
    }

    fn maybe_notify(&self, message: &Message) {
        let eligibility = self.eligibility.snapshot();
        if !gate::should_notify(message, &eligibility, self.app_visible) {
            return;
        }
        let notification = Notification::for_message(message);
        if let Err(e) = self.notifier.notify(&notification) {
            warn!(id = %message.id, error = %e, "notification not delivered");
            return;
        }
        self.emit(EngineEvent::NotificationDispatched {
            message_id: message.id.clone(),
            notification,
        });
    }

    fn spawn_delete_message(&self, thread: ThreadId, id: MessageId) {
        let store = self.store.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = store.delete_message(&thread, &id).await;
            if let Err(e) = &result {
                debug!(id = %id, error = %e, "could not remove expired record");
            }
            inbox.post(Input::StoreCallDone {
                reachable: reachable(&result),
            });
        });
    }

    fn evict_expired(&mut self) {
        let Some(thread) = self.session.active_thread.clone() else {
            return;
        };
        let now = self.clock.now_millis();
        self.forget_expired_notified(now);
        let ids = self.view.evict_expired(&self.config.retention, now);
        if !ids.is_empty() {
            debug!(thread = %thread, count = ids.len(), "expired messages evicted");
            self.emit(EngineEvent::MessagesExpired { thread, ids });
        }
    }

    fn sweep_now(&mut self, reply: oneshot::Sender<Result<usize>>) {
        let Some(thread) = self.session.active_thread.clone() else {
            let _ = reply.send(Ok(0));
            return;
        };
        let store = self.store.clone();
        let inbox = self.inbox.clone();
        let generation = self.generation;
        let now = self.clock.now_millis();
        tokio::spawn(async move {
            let result = sweep_once(&*store, &thread, now).await;
            inbox.post(Input::Swept {
                generation,
                result,
                reply: Some(reply),
            });
        });
    }

    fn on_swept(
        &mut self,
        generation: u64,
        result: StoreResult<usize>,
        reply: Option<oneshot::Sender<Result<usize>>>,
    ) {
        self.set_connection(reachable(&result));
        if generation == self.generation {
            self.evict_expired();
        }
        if let Some(reply) = reply {
            let _ = reply.send(result.map_err(ChatError::from));
        }
    }

    fn reconnect(&mut self) {
        info!("reconnecting");
        if self.session.is_admin() {
            self.start_roster_feed();
        }
        if let Some(thread) = self.session.active_thread.clone() {
            self.activate(thread, true);
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn send_message(&mut self, text: String, reply: oneshot::Sender<Result<MessageId>>) {
        let text = text.trim();
        if text.is_empty() {
            let _ = reply.send(Err(ChatError::EmptyMessage));
            return;
        }
        let thread = match self.session.send_destination() {
            Ok(thread) => thread,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let record = MessageRecord::new(
            self.session.display_name.clone(),
            text,
            self.clock.now_millis(),
        );
        let store = self.store.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = store.append(&thread, record).await;
            inbox.post(Input::StoreCallDone {
                reachable: reachable(&result),
            });
            let outcome = match result {
                Ok(id) => {
                    debug!(thread = %thread, id = %id, "message sent");
                    Ok(id)
                }
                Err(e) => {
                    warn!(thread = %thread, error = %e, "send failed");
                    Err(ChatError::SendFailed(e))
                }
            };
            let _ = reply.send(outcome);
        });
    }

    // ------------------------------------------------------------------
    // Admin: selection, roster, deletion
    // ------------------------------------------------------------------

    fn select_thread(&mut self, thread: ThreadId) -> Result<()> {
        if !self.session.is_admin() {
            return Err(ChatError::AdminOnly);
        }
        self.roster.note_selection();
        if self.session.active_thread.as_ref() == Some(&thread) {
            return Ok(());
        }
        info!(thread = %thread, "thread selected");
        self.activate(thread, false);
        Ok(())
    }

    fn start_roster_feed(&mut self) {
        self.roster_generation += 1;
        let generation = self.roster_generation;
        let store = self.store.clone();
        let inbox = self.inbox.clone();

        self.roster_feed = Some(TaskGuard::spawn(async move {
            let mut subscription = match store.subscribe_thread_list().await {
                Ok(subscription) => subscription,
                Err(e) => {
                    inbox.post(Input::ThreadListClosed {
                        generation,
                        error: Some(e),
                    });
                    return;
                }
            };
            while let Some(threads) = subscription.recv().await {
                if !inbox.post(Input::ThreadList {
                    generation,
                    threads,
                }) {
                    return;
                }
            }
            inbox.post(Input::ThreadListClosed {
                generation,
                error: None,
            });
        }));
    }

    fn on_thread_list(&mut self, generation: u64, threads: Vec<ThreadId>) {
        if generation != self.roster_generation {
            return;
        }
        self.set_connection(true);

        let auto = self
            .roster
            .apply(threads, self.session.active_thread.as_ref());
        let (roster, active) = (&self.roster, self.session.active_thread.as_ref());
        self.notified
            .retain(|thread, _| roster.contains(thread) || active == Some(thread));
        self.emit(EngineEvent::ThreadListChanged {
            threads: self.roster.threads().to_vec(),
        });

        if let Some(thread) = auto {
            info!(thread = %thread, "selecting first thread");
            self.activate(thread, false);
        }
    }

    fn on_thread_list_closed(&mut self, generation: u64, error: Option<StoreError>) {
        if generation != self.roster_generation {
            return;
        }
        self.roster_feed = None;
        match error {
            Some(e) => {
                warn!(error = %e, "thread list subscription failed");
                self.set_connection(!e.is_unavailable());
            }
            None => {
                warn!("thread list feed closed");
                self.set_connection(false);
            }
        }
    }

    pub(crate) fn request_delete(&mut self, thread: ThreadId) -> Result<DeleteRequest> {
        if !self.session.is_admin() {
            return Err(ChatError::AdminOnly);
        }
        let request = DeleteRequest::new(thread);
        self.pending_deletes
            .insert(request.id(), request.thread().clone());
        Ok(request)
    }

    fn confirm_delete(&mut self, request: DeleteRequest, reply: oneshot::Sender<Result<()>>) {
        if !self.session.is_admin() {
            let _ = reply.send(Err(ChatError::AdminOnly));
            return;
        }
        match self.pending_deletes.remove(&request.id()) {
            Some(thread) if &thread == request.thread() => {
                let store = self.store.clone();
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let result = store.delete_thread(&thread).await;
                    inbox.post(Input::ThreadDeleted {
                        thread,
                        result,
                        reply,
                    });
                });
            }
            _ => {
                let _ = reply.send(Err(ChatError::StaleDeleteRequest));
            }
        }
    }

    fn on_thread_deleted(
        &mut self,
        thread: ThreadId,
        result: StoreResult<()>,
        reply: oneshot::Sender<Result<()>>,
    ) {
        self.set_connection(reachable(&result));
        match result {
            Ok(()) => {
                info!(thread = %thread, "thread deleted");
                self.notified.remove(&thread);
                if self.session.active_thread.as_ref() == Some(&thread) {
                    self.deactivate();
                }
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                warn!(thread = %thread, error = %e, "thread delete failed");
                let _ = reply.send(Err(ChatError::from(e)));
            }
        }
    }

    // ------------------------------------------------------------------
    // State reporting
    // ------------------------------------------------------------------

    fn set_connection(&mut self, connected: bool) {
        let state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        if self.session.connection != state {
            info!(?state, "connection state changed");
            self.session.connection = state;
            self.emit(EngineEvent::ConnectionChanged { state });
        }
    }

    fn set_sync_state(&mut self, state: SyncState) {
        if self.sync_state != state {
            debug!(?state, "sync state changed");
            self.sync_state = state;
            self.emit(EngineEvent::SyncStateChanged { state });
        }
    }

    fn emit(&self, event: EngineEvent) {
        emit_event(&self.events, event);
    }
}

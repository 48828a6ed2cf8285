use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use ephchat_shared::constants::RETENTION_WINDOW_MS;
use ephchat_shared::{
    ConnectionState, ManualClock, Message, MessageId, MessageRecord, PermissionState, StoredMessage,
    ThreadId,
};
use ephchat_store::{
    DeviceEligibilityStore, DeviceFlags, MemoryDeviceFlags, MemoryThreadStore, ThreadStore,
};

use super::handle::Command;
use super::worker::{Input, Worker};
use super::*;
use crate::error::ChatError;
use crate::events::SyncState;
use crate::notifier::{ChannelNotifier, Notification};

const WAIT: Duration = Duration::from_secs(5);
const ADMIN: &str = "Admin";
const T0: i64 = 1_700_000_000_000;

struct Harness {
    handle: EngineHandle,
    events: mpsc::Receiver<EngineEvent>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    device: Arc<MemoryDeviceFlags>,
}

fn config() -> EngineConfig {
    EngineConfig {
        admin_name: ADMIN.to_string(),
        ..EngineConfig::default()
    }
}

fn start(store: &MemoryThreadStore, name: &str, flags: DeviceFlags, clock: Arc<ManualClock>) -> Harness {
    start_with(store, name, flags, clock, config())
}

fn start_with(
    store: &MemoryThreadStore,
    name: &str,
    flags: DeviceFlags,
    clock: Arc<ManualClock>,
    config: EngineConfig,
) -> Harness {
    let device = Arc::new(MemoryDeviceFlags::new(flags));
    let (notifier, notifications) = ChannelNotifier::channel();
    let deps = EngineDeps::new(device.clone())
        .with_notifier(Arc::new(notifier))
        .with_clock(clock);
    let session = ChatSession::for_identity(name, ADMIN);
    let (handle, events) = spawn_engine(Arc::new(store.clone()), session, deps, config);
    Harness {
        handle,
        events,
        notifications,
        device,
    }
}

fn granted_admin_device() -> DeviceFlags {
    DeviceFlags {
        admin_device: true,
        permission_granted: true,
    }
}

async fn wait_for<F>(events: &mut mpsc::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("engine event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

async fn wait_synced(events: &mut mpsc::Receiver<EngineEvent>) {
    wait_for(events, |e| {
        matches!(e, EngineEvent::SyncStateChanged { state: SyncState::Synced })
    })
    .await;
}

async fn wait_added(events: &mut mpsc::Receiver<EngineEvent>, text: &str) -> Message {
    let event = wait_for(events, |e| {
        matches!(e, EngineEvent::MessageAdded { message, .. } if message.text == text)
    })
    .await;
    match event {
        EngineEvent::MessageAdded { message, .. } => message,
        _ => unreachable!(),
    }
}

async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn jan() -> ThreadId {
    ThreadId::from_display_name("Jan Novak")
}

// ----------------------------------------------------------------------
// Sending
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_user_message_lands_in_own_thread() {
    let store = MemoryThreadStore::new();
    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    wait_synced(&mut user.events).await;

    let id = user.handle.send("  Hello  ").await.unwrap();
    let message = wait_added(&mut user.events, "Hello").await;
    assert_eq!(message.id, id);
    assert_eq!(message.sender_name, "Jan Novak");
    assert_eq!(message.sent_at_millis, T0);
    assert!(!message.is_from_admin);

    let stored = store.messages(&ThreadId::from_raw("jan_novak")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.text, "Hello");
    assert_eq!(user.handle.messages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let store = MemoryThreadStore::new();
    let user = start(&store, "Jan Novak", DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    assert!(matches!(user.handle.send(" \n\t ").await, Err(ChatError::EmptyMessage)));
    assert!(store.thread_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_send_without_selection() {
    let store = MemoryThreadStore::new();
    let mut admin = start(&store, ADMIN, DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    wait_for(&mut admin.events, |e| matches!(e, EngineEvent::ThreadListChanged { .. })).await;

    let result = admin.handle.send("anyone there?").await;
    assert!(matches!(result, Err(ChatError::ThreadNotSelected)));
    assert!(store.thread_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_failure_then_reconnect() {
    let store = MemoryThreadStore::new();
    let clock = Arc::new(ManualClock::new(T0));
    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), clock);
    wait_synced(&mut user.events).await;
    user.handle.send("before").await.unwrap();
    wait_added(&mut user.events, "before").await;

    store.set_online(false).unwrap();
    let result = user.handle.send("lost").await;
    assert!(matches!(result, Err(ChatError::SendFailed(_))));
    wait_for(&mut user.events, |e| {
        matches!(e, EngineEvent::SyncStateChanged { state: SyncState::Unsubscribed })
    })
    .await;

    let status = user.handle.status().await.unwrap();
    assert_eq!(status.session.connection, ConnectionState::Disconnected);
    // The failed send never reached the view.
    assert_eq!(user.handle.messages().await.unwrap().len(), 1);

    store.set_online(true).unwrap();
    user.handle.reconnect().unwrap();
    wait_for(&mut user.events, |e| {
        matches!(e, EngineEvent::SyncStateChanged { state: SyncState::Resubscribing })
    })
    .await;
    wait_synced(&mut user.events).await;

    let status = user.handle.status().await.unwrap();
    assert_eq!(status.session.connection, ConnectionState::Connected);
    let messages = user.handle.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "before");
}

// ----------------------------------------------------------------------
// Admin roster and notifications
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_admin_reply_does_not_notify() {
    let store = MemoryThreadStore::new();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "Hello", T0))
        .await
        .unwrap();

    let mut admin = start(&store, ADMIN, granted_admin_device(), Arc::new(ManualClock::new(T0 + 1_000)));
    admin.handle.set_app_visible(false).unwrap();

    let changed = wait_for(&mut admin.events, |e| {
        matches!(e, EngineEvent::ActiveThreadChanged { thread: Some(_) })
    })
    .await;
    assert!(matches!(changed, EngineEvent::ActiveThreadChanged { thread: Some(t) } if t == jan()));

    let first = timeout(WAIT, admin.notifications.recv()).await.unwrap().unwrap();
    assert_eq!(first.title, "New message from Jan Novak");
    assert_eq!(first.body, "Hello");

    admin.handle.send("Hi Jan").await.unwrap();
    let reply = wait_added(&mut admin.events, "Hi Jan").await;
    assert!(reply.is_from_admin);
    assert!(admin.notifications.try_recv().is_err());

    let texts: Vec<_> = store.messages(&jan()).unwrap().into_iter().map(|m| m.record.text).collect();
    assert_eq!(texts, vec!["Hello", "Hi Jan"]);
}

#[tokio::test]
async fn test_first_user_message_appears_for_admin() {
    let store = MemoryThreadStore::new();
    let clock = Arc::new(ManualClock::new(T0));
    let mut admin = start(&store, ADMIN, DeviceFlags::default(), clock.clone());
    let initial = wait_for(&mut admin.events, |e| matches!(e, EngineEvent::ThreadListChanged { .. })).await;
    assert!(matches!(initial, EngineEvent::ThreadListChanged { threads } if threads.is_empty()));

    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), clock);
    wait_synced(&mut user.events).await;
    user.handle.send("Hello").await.unwrap();

    let listed = wait_for(&mut admin.events, |e| {
        matches!(e, EngineEvent::ThreadListChanged { threads } if !threads.is_empty())
    })
    .await;
    assert!(matches!(listed, EngineEvent::ThreadListChanged { threads } if threads == vec![jan()]));

    wait_added(&mut admin.events, "Hello").await;
    let status = admin.handle.status().await.unwrap();
    assert_eq!(status.session.active_thread, Some(jan()));
    assert_eq!(status.threads, vec![jan()]);
}

#[tokio::test]
async fn test_marked_device_notifies_user_session() {
    let store = MemoryThreadStore::new();
    let eva = ThreadId::from_display_name("Eva");
    let mut user = start(&store, "Eva", granted_admin_device(), Arc::new(ManualClock::new(T0)));
    user.handle.set_app_visible(false).unwrap();
    wait_synced(&mut user.events).await;

    let status = user.handle.status().await.unwrap();
    assert!(!status.eligibility.is_admin_role);
    assert!(status.eligibility.is_marked_admin_device);
    assert_eq!(status.eligibility.permission, PermissionState::Granted);

    store.append(&eva, MessageRecord::new("Eva", "from my phone", T0)).await.unwrap();
    let dispatched = wait_for(&mut user.events, |e| {
        matches!(e, EngineEvent::NotificationDispatched { .. })
    })
    .await;
    assert!(matches!(
        dispatched,
        EngineEvent::NotificationDispatched { notification, .. } if notification.body == "from my phone"
    ));
    assert!(user.notifications.try_recv().is_ok());
}

#[tokio::test]
async fn test_redelivery_is_absorbed() {
    let store = MemoryThreadStore::new();
    let first_id = store
        .append(&jan(), MessageRecord::new("Jan Novak", "once", T0))
        .await
        .unwrap();

    let mut admin = start(&store, ADMIN, granted_admin_device(), Arc::new(ManualClock::new(T0)));
    admin.handle.set_app_visible(false).unwrap();
    wait_added(&mut admin.events, "once").await;

    assert!(store.redeliver(&jan(), &first_id).unwrap());
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "marker", T0 + 1))
        .await
        .unwrap();

    let duplicate = timeout(WAIT, async {
        loop {
            match admin.events.recv().await.unwrap() {
                EngineEvent::MessageAdded { message, .. } if message.id == first_id => return true,
                EngineEvent::MessageAdded { message, .. } if message.text == "marker" => return false,
                _ => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(!duplicate);

    let mut bodies = Vec::new();
    while let Ok(n) = admin.notifications.try_recv() {
        bodies.push(n.body);
    }
    assert_eq!(bodies, vec!["once", "marker"]);
    assert_eq!(admin.handle.messages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_switching_back_does_not_notify_again() {
    let store = MemoryThreadStore::new();
    let eva = ThreadId::from_display_name("Eva");
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "only once", T0))
        .await
        .unwrap();
    store
        .append(&eva, MessageRecord::new("Eva", "eva msg", T0))
        .await
        .unwrap();

    let mut admin = start(&store, ADMIN, granted_admin_device(), Arc::new(ManualClock::new(T0)));
    admin.handle.set_app_visible(false).unwrap();
    wait_added(&mut admin.events, "only once").await;

    admin.handle.select_thread(eva.clone()).await.unwrap();
    wait_added(&mut admin.events, "eva msg").await;
    admin.handle.select_thread(jan()).await.unwrap();
    wait_added(&mut admin.events, "only once").await;
    admin.handle.select_thread(eva).await.unwrap();
    wait_added(&mut admin.events, "eva msg").await;

    let mut bodies = Vec::new();
    while let Ok(n) = admin.notifications.try_recv() {
        bodies.push(n.body);
    }
    assert_eq!(bodies, vec!["only once", "eva msg"]);
}

#[tokio::test]
async fn test_deleted_thread_forgets_notified_ids() {
    let store = MemoryThreadStore::new();
    let (mut worker, mut rx, _tx) = worker(&store);

    select(&mut worker, jan());
    worker.handle_input(Input::Delivered {
        generation: worker.generation,
        message: StoredMessage {
            id: MessageId::from_seq(1),
            record: MessageRecord::new("Jan Novak", "hello", T0),
        },
    });
    assert!(worker.has_notified(&jan(), &MessageId::from_seq(1)));

    let request = worker.request_delete(jan()).unwrap();
    let (reply, mut reply_rx) = oneshot::channel();
    worker.handle_input(Input::Command(Command::ConfirmDelete { request, reply }));
    loop {
        let input = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        worker.handle_input(input);
        if let Ok(result) = reply_rx.try_recv() {
            result.unwrap();
            break;
        }
    }
    assert!(!worker.has_notified(&jan(), &MessageId::from_seq(1)));
}

#[tokio::test]
async fn test_view_sorted_by_send_time() {
    let store = MemoryThreadStore::new();
    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    wait_synced(&mut user.events).await;

    for (text, time) in [("c", T0 - 10), ("a", T0 - 30), ("b", T0 - 20)] {
        store.append(&jan(), MessageRecord::new("Jan Novak", text, time)).await.unwrap();
    }
    wait_added(&mut user.events, "b").await;

    let texts: Vec<_> = user
        .handle
        .messages()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_user_cannot_use_admin_operations() {
    let store = MemoryThreadStore::new();
    let user = start(&store, "Jan Novak", DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    assert!(matches!(
        user.handle.select_thread(ThreadId::from_raw("eva")).await,
        Err(ChatError::AdminOnly)
    ));
    assert!(matches!(
        user.handle.request_delete(jan()).await,
        Err(ChatError::AdminOnly)
    ));
}

// ----------------------------------------------------------------------
// Retention
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_expiry_hides_then_sweeps() {
    let store = MemoryThreadStore::new();
    let clock = Arc::new(ManualClock::new(T0));
    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), clock.clone());
    wait_synced(&mut user.events).await;
    user.handle.send("short lived").await.unwrap();
    let message = wait_added(&mut user.events, "short lived").await;

    clock.set(T0 + RETENTION_WINDOW_MS + 1);
    assert!(user.handle.messages().await.unwrap().is_empty());

    assert_eq!(user.handle.sweep_now().await.unwrap(), 1);
    let expired = wait_for(&mut user.events, |e| matches!(e, EngineEvent::MessagesExpired { .. })).await;
    assert!(matches!(expired, EngineEvent::MessagesExpired { ids, .. } if ids == vec![message.id.clone()]));
    assert!(store.messages(&jan()).unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_on_arrival_is_deleted() {
    let store = MemoryThreadStore::new();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "stale", T0))
        .await
        .unwrap();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "fresh", T0 + RETENTION_WINDOW_MS))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(T0 + RETENTION_WINDOW_MS + 1));
    let mut user = start(&store, "Jan Novak", DeviceFlags::default(), clock);
    wait_added(&mut user.events, "fresh").await;

    eventually(|| store.messages(&jan()).unwrap().len() == 1).await;
    let messages = user.handle.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "fresh");
}

#[tokio::test]
async fn test_sweep_without_active_thread() {
    let store = MemoryThreadStore::new();
    let admin = start(&store, ADMIN, DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    assert_eq!(admin.handle.sweep_now().await.unwrap(), 0);
}

fn fast_sweep() -> EngineConfig {
    EngineConfig {
        sweep_interval: Duration::from_millis(20),
        ..config()
    }
}

#[tokio::test]
async fn test_sweep_timer_removes_expired() {
    let store = MemoryThreadStore::new();
    let clock = Arc::new(ManualClock::new(T0));
    let mut user = start_with(&store, "Jan Novak", DeviceFlags::default(), clock.clone(), fast_sweep());
    wait_synced(&mut user.events).await;
    user.handle.send("short lived").await.unwrap();
    let message = wait_added(&mut user.events, "short lived").await;

    clock.set(T0 + RETENTION_WINDOW_MS + 1);
    let expired = wait_for(&mut user.events, |e| matches!(e, EngineEvent::MessagesExpired { .. })).await;
    assert!(matches!(
        expired,
        EngineEvent::MessagesExpired { thread, ids } if thread == jan() && ids == vec![message.id.clone()]
    ));
    assert!(store.messages(&jan()).unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_timer_follows_active_thread() {
    let store = MemoryThreadStore::new();
    let eva = ThreadId::from_display_name("Eva");
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "jan old", T0))
        .await
        .unwrap();
    store
        .append(&eva, MessageRecord::new("Eva", "eva old", T0))
        .await
        .unwrap();
    store
        .append(&eva, MessageRecord::new("Eva", "eva new", T0 + RETENTION_WINDOW_MS))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(T0));
    let mut admin = start_with(&store, ADMIN, DeviceFlags::default(), clock.clone(), fast_sweep());
    wait_added(&mut admin.events, "jan old").await;
    admin.handle.select_thread(eva.clone()).await.unwrap();
    wait_added(&mut admin.events, "eva new").await;

    clock.set(T0 + RETENTION_WINDOW_MS + 1);
    wait_for(&mut admin.events, |e| {
        matches!(e, EngineEvent::MessagesExpired { thread, .. } if *thread == eva)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Only the active thread is swept.
    assert_eq!(store.messages(&jan()).unwrap().len(), 1);
    let left: Vec<_> = store.messages(&eva).unwrap().into_iter().map(|m| m.record.text).collect();
    assert_eq!(left, vec!["eva new"]);
}

#[tokio::test]
async fn test_sweep_timer_stops_after_delete() {
    let store = MemoryThreadStore::new();
    let eva = ThreadId::from_display_name("Eva");
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "jan old", T0))
        .await
        .unwrap();
    store
        .append(&eva, MessageRecord::new("Eva", "eva old", T0))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(T0));
    let mut admin = start_with(&store, ADMIN, DeviceFlags::default(), clock.clone(), fast_sweep());
    wait_added(&mut admin.events, "jan old").await;

    let request = admin.handle.request_delete(jan()).await.unwrap();
    admin.handle.confirm_delete(request).await.unwrap();
    assert_eq!(admin.handle.status().await.unwrap().sync_state, SyncState::Idle);

    clock.set(T0 + RETENTION_WINDOW_MS + 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.messages(&eva).unwrap().len(), 1);
}

#[tokio::test]
async fn test_expired_ids_leave_notified_set() {
    let store = MemoryThreadStore::new();
    let clock = Arc::new(ManualClock::new(T0));
    let (mut worker, mut rx, _tx) = worker_with_clock(&store, clock.clone());

    select(&mut worker, jan());
    worker.handle_input(Input::Delivered {
        generation: worker.generation,
        message: StoredMessage {
            id: MessageId::from_seq(1),
            record: MessageRecord::new("Jan Novak", "hello", T0),
        },
    });
    assert!(worker.has_notified(&jan(), &MessageId::from_seq(1)));

    clock.set(T0 + RETENTION_WINDOW_MS + 1);
    let (reply, mut reply_rx) = oneshot::channel();
    worker.handle_input(Input::Command(Command::SweepNow { reply }));
    loop {
        let input = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        worker.handle_input(input);
        if let Ok(result) = reply_rx.try_recv() {
            result.unwrap();
            break;
        }
    }
    assert!(!worker.has_notified(&jan(), &MessageId::from_seq(1)));
    assert!(worker.view.is_empty());
}

// ----------------------------------------------------------------------
// Deletion
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_delete_active_thread_returns_to_idle() {
    let store = MemoryThreadStore::new();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "Hello", T0))
        .await
        .unwrap();
    let mut admin = start(&store, ADMIN, DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    wait_added(&mut admin.events, "Hello").await;

    let request = admin.handle.request_delete(jan()).await.unwrap();
    assert_eq!(request.label(), "Jan Novak");
    // Requesting is not destructive.
    assert_eq!(store.messages(&jan()).unwrap().len(), 1);

    admin.handle.confirm_delete(request.clone()).await.unwrap();
    assert!(store.thread_ids().unwrap().is_empty());

    let status = admin.handle.status().await.unwrap();
    assert_eq!(status.session.active_thread, None);
    assert_eq!(status.sync_state, SyncState::Idle);
    assert!(admin.handle.messages().await.unwrap().is_empty());

    assert!(matches!(
        admin.handle.confirm_delete(request).await,
        Err(ChatError::StaleDeleteRequest)
    ));
}

#[tokio::test]
async fn test_cancelled_delete_keeps_thread() {
    let store = MemoryThreadStore::new();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "Hello", T0))
        .await
        .unwrap();
    let admin = start(&store, ADMIN, DeviceFlags::default(), Arc::new(ManualClock::new(T0)));

    let request = admin.handle.request_delete(jan()).await.unwrap();
    admin.handle.cancel_delete(request.clone()).unwrap();
    assert!(matches!(
        admin.handle.confirm_delete(request).await,
        Err(ChatError::StaleDeleteRequest)
    ));
    assert_eq!(store.thread_ids().unwrap(), vec![jan()]);
}

// ----------------------------------------------------------------------
// Device eligibility and lifecycle
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_permission_and_reset() {
    let store = MemoryThreadStore::new();
    let admin = start(&store, ADMIN, DeviceFlags::default(), Arc::new(ManualClock::new(T0)));

    admin.handle.set_permission(PermissionState::Granted).await.unwrap();
    assert_eq!(admin.device.get().unwrap(), granted_admin_device());

    admin.handle.reset_device().await.unwrap();
    assert_eq!(admin.device.get().unwrap(), DeviceFlags::default());
    let status = admin.handle.status().await.unwrap();
    assert_eq!(status.eligibility.permission, PermissionState::NotYetAsked);
    assert!(!status.eligibility.is_marked_admin_device);
}

#[tokio::test]
async fn test_shutdown_stops_engine() {
    let store = MemoryThreadStore::new();
    let user = start(&store, "Jan Novak", DeviceFlags::default(), Arc::new(ManualClock::new(T0)));
    user.handle.shutdown().await.unwrap();
    assert!(matches!(user.handle.send("late").await, Err(ChatError::EngineStopped)));
}

// ----------------------------------------------------------------------
// Worker internals: stale subscription generations
// ----------------------------------------------------------------------

type WorkerParts = (
    Worker<MemoryThreadStore>,
    mpsc::UnboundedReceiver<Input>,
    mpsc::UnboundedSender<Input>,
);

fn worker(store: &MemoryThreadStore) -> WorkerParts {
    worker_with_clock(store, Arc::new(ManualClock::new(T0)))
}

fn worker_with_clock(store: &MemoryThreadStore, clock: Arc<ManualClock>) -> WorkerParts {
    let (tx, rx) = mpsc::unbounded_channel();
    let (event_tx, _) = mpsc::channel(64);
    let deps = EngineDeps::new(Arc::new(MemoryDeviceFlags::default())).with_clock(clock);
    let worker = Worker::new(
        Arc::new(store.clone()),
        ChatSession::for_identity(ADMIN, ADMIN),
        deps,
        config(),
        Inbox::new(&tx),
        event_tx,
    );
    (worker, rx, tx)
}

async fn pump_until<F>(worker: &mut Worker<MemoryThreadStore>, rx: &mut mpsc::UnboundedReceiver<Input>, mut done: F)
where
    F: FnMut(&Worker<MemoryThreadStore>) -> bool,
{
    while !done(worker) {
        let input = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        worker.handle_input(input);
    }
}

fn late_delivery(generation: u64) -> Input {
    Input::Delivered {
        generation,
        message: StoredMessage {
            id: MessageId::from_seq(99),
            record: MessageRecord::new("Jan Novak", "late", T0),
        },
    }
}

fn select(worker: &mut Worker<MemoryThreadStore>, thread: ThreadId) {
    let (reply, _) = oneshot::channel();
    worker.handle_input(Input::Command(Command::SelectThread { thread, reply }));
}

#[tokio::test]
async fn test_delivery_after_delete_is_dropped() {
    let store = MemoryThreadStore::new();
    store
        .append(&jan(), MessageRecord::new("Jan Novak", "first", T0))
        .await
        .unwrap();
    let (mut worker, mut rx, _tx) = worker(&store);

    select(&mut worker, jan());
    pump_until(&mut worker, &mut rx, |w| w.view.len() == 1).await;
    let old_generation = worker.generation;

    let request = worker.request_delete(jan()).unwrap();
    let (reply, mut reply_rx) = oneshot::channel();
    worker.handle_input(Input::Command(Command::ConfirmDelete { request, reply }));
    loop {
        let input = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        worker.handle_input(input);
        if let Ok(result) = reply_rx.try_recv() {
            result.unwrap();
            break;
        }
    }

    worker.handle_input(late_delivery(old_generation));
    assert!(worker.view.is_empty());
    assert_eq!(worker.session.active_thread, None);
    assert_eq!(worker.sync_state, SyncState::Idle);
}

#[tokio::test]
async fn test_switching_threads_ignores_old_feed() {
    let store = MemoryThreadStore::new();
    let eva = ThreadId::from_display_name("Eva");
    store
        .append(&eva, MessageRecord::new("Eva", "hi from eva", T0))
        .await
        .unwrap();
    let (mut worker, mut rx, _tx) = worker(&store);

    select(&mut worker, jan());
    let jan_generation = worker.generation;
    select(&mut worker, eva.clone());
    pump_until(&mut worker, &mut rx, |w| w.view.len() == 1).await;

    worker.handle_input(late_delivery(jan_generation));
    assert_eq!(worker.view.len(), 1);
    assert_eq!(worker.session.active_thread, Some(eva));
    assert!(!worker.view.contains(&MessageId::from_seq(99)));
}

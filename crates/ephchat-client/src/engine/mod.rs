//! The thread sync engine.
//!
//! A single tokio task owns the session, the message view and the roster,
//! and drains one input queue. Caller commands, subscription deliveries,
//! sweep results and store-call outcomes all arrive on that queue, so state
//! is only ever touched from one place.
//!
//! Store calls never run on the engine task itself. They are spawned and
//! post their outcome back as another input.

mod handle;
mod worker;

#[cfg(test)]
mod tests;

pub use handle::{DeleteRequest, EngineHandle, EngineStatus};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ephchat_shared::{Clock, SystemClock};
use ephchat_store::{DeviceEligibilityStore, ThreadStore};

use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::notifier::{Notifier, TracingNotifier};
use crate::session::ChatSession;

use worker::{Input, Worker};

/// Collaborators the engine does not own.
pub struct EngineDeps {
    pub device: Arc<dyn DeviceEligibilityStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl EngineDeps {
    /// Wall clock and log-only notifications.
    pub fn new(device: Arc<dyn DeviceEligibilityStore>) -> Self {
        Self {
            device,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Start the engine for `session` on the current tokio runtime.
///
/// The engine runs until [`EngineHandle::shutdown`] is called or every
/// handle is dropped.
pub fn spawn_engine<S: ThreadStore>(
    store: Arc<S>,
    session: ChatSession,
    deps: EngineDeps,
    config: EngineConfig,
) -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

    let worker = Worker::new(store, session, deps, config, Inbox::new(&input_tx), event_tx);
    tokio::spawn(worker.run(input_rx));

    (EngineHandle::new(input_tx), event_rx)
}

/// Back channel for tasks spawned by the engine.
///
/// Holds the queue weakly: only handles keep the engine alive.
#[derive(Clone)]
pub(crate) struct Inbox(mpsc::WeakUnboundedSender<Input>);

impl Inbox {
    pub(crate) fn new(tx: &mpsc::UnboundedSender<Input>) -> Self {
        Self(tx.downgrade())
    }

    /// `false` once the engine is gone.
    pub(crate) fn post(&self, input: Input) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(input).is_ok(),
            None => false,
        }
    }
}

/// A spawned task that is aborted when the guard is dropped.
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

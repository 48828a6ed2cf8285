//! Client side of the ephemeral chat: per-session sync engine, message view,
//! thread roster and notification gating.
//!
//! Start a session with [`spawn_engine`] and drive it through the returned
//! [`EngineHandle`]; everything the engine observes comes back as
//! [`EngineEvent`]s.

pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod notifier;
pub mod roster;
pub mod session;
pub mod view;

pub use config::EngineConfig;
pub use eligibility::{EligibilityTracker, NotificationEligibility};
pub use engine::{spawn_engine, DeleteRequest, EngineDeps, EngineHandle, EngineStatus};
pub use error::{ChatError, Result};
pub use events::{EngineEvent, SyncState};
pub use notifier::{ChannelNotifier, Notification, Notifier, NotifyError, TracingNotifier};
pub use roster::ThreadRoster;
pub use session::ChatSession;
pub use view::MessageView;

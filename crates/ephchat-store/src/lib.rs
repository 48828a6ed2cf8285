//! # ephchat-store
//!
//! The append-only, per-thread message log the sync engine talks to.
//!
//! [`ThreadStore`] is the boundary the engine depends on. Two
//! implementations ship with the crate:
//!
//! - [`MemoryThreadStore`] pushes appends to in-process subscribers and can
//!   simulate an outage.
//! - [`SqliteThreadStore`] keeps the log in a SQLite file and feeds
//!   subscribers by polling, so several processes can share one database.
//!
//! The crate also persists the per-device notification flags behind
//! [`DeviceEligibilityStore`].

pub mod database;
pub mod device;
pub mod memory;
pub mod messages;
pub mod migrations;
pub mod sqlite;
pub mod store;

mod error;

pub use database::Database;
pub use device::{DeviceEligibilityStore, DeviceFlags, MemoryDeviceFlags, SqliteDeviceFlags};
pub use error::{Result, StoreError};
pub use memory::MemoryThreadStore;
pub use sqlite::SqliteThreadStore;
pub use store::{Subscription, ThreadStore};

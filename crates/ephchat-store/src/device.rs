//! Per-device notification flags.
//!
//! A device that ever hosted an admin session stays "admin" until reset, so
//! it keeps getting notifications after logout. The flags are keyed to the
//! device, never to a session.

use std::sync::{Arc, Mutex};

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use ephchat_shared::constants::{DEVICE_ADMIN_KEY, DEVICE_PERMISSION_KEY};

use crate::database::Database;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFlags {
    /// This device previously authenticated as admin.
    pub admin_device: bool,
    /// Notification permission was granted on this device.
    pub permission_granted: bool,
}

/// Persisted device flags capability.
pub trait DeviceEligibilityStore: Send + Sync {
    fn get(&self) -> Result<DeviceFlags>;
    fn set(&self, flags: DeviceFlags) -> Result<()>;
    /// Explicit reset; both flags go back to `false`.
    fn clear(&self) -> Result<()>;
}

/// Process-local flags, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryDeviceFlags {
    flags: Mutex<DeviceFlags>,
}

impl MemoryDeviceFlags {
    pub fn new(flags: DeviceFlags) -> Self {
        Self {
            flags: Mutex::new(flags),
        }
    }
}

impl DeviceEligibilityStore for MemoryDeviceFlags {
    fn get(&self) -> Result<DeviceFlags> {
        Ok(*self.flags.lock().map_err(|_| StoreError::LockPoisoned)?)
    }

    fn set(&self, flags: DeviceFlags) -> Result<()> {
        *self.flags.lock().map_err(|_| StoreError::LockPoisoned)? = flags;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.set(DeviceFlags::default())
    }
}

impl Database {
    pub fn get_device_flag(&self, key: &str) -> Result<Option<bool>> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM device_flags WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    pub fn set_device_flag(&self, key: &str, value: bool) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO device_flags (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    pub fn remove_device_flag(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM device_flags WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Flags persisted in the `device_flags` table.
#[derive(Clone)]
pub struct SqliteDeviceFlags {
    db: Arc<Mutex<Database>>,
}

impl SqliteDeviceFlags {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl DeviceEligibilityStore for SqliteDeviceFlags {
    fn get(&self) -> Result<DeviceFlags> {
        let db = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(DeviceFlags {
            admin_device: db.get_device_flag(DEVICE_ADMIN_KEY)?.unwrap_or(false),
            permission_granted: db.get_device_flag(DEVICE_PERMISSION_KEY)?.unwrap_or(false),
        })
    }

    fn set(&self, flags: DeviceFlags) -> Result<()> {
        let db = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        db.set_device_flag(DEVICE_ADMIN_KEY, flags.admin_device)?;
        db.set_device_flag(DEVICE_PERMISSION_KEY, flags.permission_granted)
    }

    fn clear(&self) -> Result<()> {
        let db = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        db.remove_device_flag(DEVICE_ADMIN_KEY)?;
        db.remove_device_flag(DEVICE_PERMISSION_KEY)
    }
}

//! Device-level notification eligibility.
//!
//! An admin session marks the device; the mark and a granted permission
//! persist across sessions until an explicit reset.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use ephchat_shared::{PermissionState, Role};
use ephchat_store::{DeviceEligibilityStore, DeviceFlags};

use crate::error::Result;

/// Snapshot consulted by the notification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEligibility {
    pub is_admin_role: bool,
    pub is_marked_admin_device: bool,
    pub permission: PermissionState,
}

/// Keeps the persisted device flags and the session's permission state in
/// step. Flags are cached after startup; all writes go through here.
pub struct EligibilityTracker {
    device: Arc<dyn DeviceEligibilityStore>,
    role: Role,
    flags: DeviceFlags,
    permission: PermissionState,
}

impl EligibilityTracker {
    /// Load the device flags and, for an admin session, mark the device.
    ///
    /// Store failures are logged and leave the device unmarked.
    pub fn start(device: Arc<dyn DeviceEligibilityStore>, role: Role) -> Self {
        let mut flags = device.get().unwrap_or_else(|e| {
            warn!(error = %e, "could not read device flags");
            DeviceFlags::default()
        });

        if role == Role::Admin && !flags.admin_device {
            flags.admin_device = true;
            match device.set(flags) {
                Ok(()) => info!("device marked as admin device"),
                Err(e) => warn!(error = %e, "could not mark admin device"),
            }
        }

        let permission = if flags.permission_granted {
            PermissionState::Granted
        } else {
            PermissionState::NotYetAsked
        };

        Self {
            device,
            role,
            flags,
            permission,
        }
    }

    pub fn snapshot(&self) -> NotificationEligibility {
        NotificationEligibility {
            is_admin_role: self.role == Role::Admin,
            is_marked_admin_device: self.flags.admin_device,
            permission: self.permission,
        }
    }

    fn eligible_device(&self) -> bool {
        self.role == Role::Admin || self.flags.admin_device
    }

    /// Record the platform's answer to a permission request.
    ///
    /// A grant is persisted only on a device that may notify at all.
    pub fn set_permission(&mut self, permission: PermissionState) -> Result<()> {
        self.permission = permission;
        let granted = permission == PermissionState::Granted && self.eligible_device();
        if granted != self.flags.permission_granted {
            let next = DeviceFlags {
                permission_granted: granted,
                ..self.flags
            };
            self.device.set(next)?;
            self.flags = next;
        }
        info!(?permission, persisted = granted, "notification permission updated");
        Ok(())
    }

    /// Forget that this device ever hosted an admin session.
    pub fn reset(&mut self) -> Result<()> {
        self.device.clear()?;
        self.flags = DeviceFlags::default();
        self.permission = PermissionState::NotYetAsked;
        info!("device eligibility reset");
        Ok(())
    }
}

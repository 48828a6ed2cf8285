//! Driver configuration loaded from environment variables.
//!
//! Everything has a default except the display name, which is asked for on
//! stdin when `EPHCHAT_NAME` is not set.

use std::path::PathBuf;
use std::time::Duration;

use ephchat_client::EngineConfig;
use ephchat_shared::constants::{DEFAULT_ADMIN_NAME, DEFAULT_POLL_INTERVAL, DEFAULT_SWEEP_INTERVAL};
use ephchat_shared::PermissionState;

/// Used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,ephchat=debug,ephchat_client=debug,ephchat_store=info";

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Name to log in with.
    /// Env: `EPHCHAT_NAME`
    pub display_name: Option<String>,

    /// Logging in under this name starts an admin session.
    /// Env: `EPHCHAT_ADMIN_NAME`
    /// Default: `"Admin"`
    pub admin_name: String,

    /// SQLite file shared by every session on this machine.
    /// Env: `EPHCHAT_DB_PATH`
    /// Default: the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Env: `EPHCHAT_SWEEP_INTERVAL_SECS`
    /// Default: one hour.
    pub sweep_interval: Duration,

    /// How often SQLite subscriptions look for new rows.
    /// Env: `EPHCHAT_POLL_INTERVAL_MS`
    /// Default: 500 ms.
    pub poll_interval: Duration,

    /// Platform answer to the notification permission request, if known.
    /// Env: `EPHCHAT_NOTIFICATIONS` (`granted` / `denied`)
    pub notifications: Option<PermissionState>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            admin_name: DEFAULT_ADMIN_NAME.to_string(),
            db_path: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            notifications: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("EPHCHAT_NAME") {
            let name = name.trim();
            if !name.is_empty() {
                config.display_name = Some(name.to_string());
            }
        }

        if let Some(admin) = lookup("EPHCHAT_ADMIN_NAME") {
            let admin = admin.trim();
            if admin.is_empty() {
                tracing::warn!("Empty EPHCHAT_ADMIN_NAME, using default");
            } else {
                config.admin_name = admin.to_string();
            }
        }

        if let Some(path) = lookup("EPHCHAT_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("EPHCHAT_SWEEP_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.sweep_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid EPHCHAT_SWEEP_INTERVAL_SECS, using default"),
            }
        }

        if let Some(val) = lookup("EPHCHAT_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid EPHCHAT_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Some(val) = lookup("EPHCHAT_NOTIFICATIONS") {
            match parse_permission(&val) {
                Some(permission) => config.notifications = Some(permission),
                None => tracing::warn!(value = %val, "Invalid EPHCHAT_NOTIFICATIONS, ignoring"),
            }
        }

        config
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            admin_name: self.admin_name.clone(),
            sweep_interval: self.sweep_interval,
            ..EngineConfig::default()
        }
    }
}

/// `granted` / `denied`, case-insensitive.
pub fn parse_permission(value: &str) -> Option<PermissionState> {
    match value.trim().to_ascii_lowercase().as_str() {
        "granted" => Some(PermissionState::Granted),
        "denied" => Some(PermissionState::Denied),
        _ => None,
    }
}

use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "ephchat";

/// Display name that identifies the administrator when none is configured.
pub const DEFAULT_ADMIN_NAME: &str = "Admin";

/// Messages older than this are purged (10 hours).
pub const RETENTION_WINDOW_MS: i64 = 36_000_000;

/// Same window as a `Duration`.
pub const RETENTION_WINDOW: Duration = Duration::from_millis(RETENTION_WINDOW_MS as u64);

/// How often the active thread is swept for expired messages.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How often the SQLite store polls for new records.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Root of the keyed log: records live at `threads/{thread_id}/{message_id}`.
pub const THREADS_ROOT: &str = "threads";

/// Separator that replaces whitespace runs in thread ids.
pub const THREAD_SEPARATOR: char = '_';

/// Maximum number of characters of message text shown in a notification.
pub const NOTIFICATION_PREVIEW_CHARS: usize = 100;

/// Appended to a notification preview that was cut short.
pub const NOTIFICATION_ELLIPSIS: &str = "...";

/// All notifications share one tag so the platform replaces instead of stacking.
pub const NOTIFICATION_TAG: &str = "ephchat-message";

pub const NOTIFICATION_ICON: &str = "/icon.svg";

/// Persisted per-device keys.
pub const DEVICE_ADMIN_KEY: &str = "ephchat-admin-device";
pub const DEVICE_PERMISSION_KEY: &str = "ephchat-admin-device-permission";

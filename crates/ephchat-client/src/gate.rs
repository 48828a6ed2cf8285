//! Decides whether an incoming message produces a platform notification.

use ephchat_shared::constants::{NOTIFICATION_ELLIPSIS, NOTIFICATION_PREVIEW_CHARS};
use ephchat_shared::{Message, PermissionState};

use crate::eligibility::NotificationEligibility;

/// Pure decision, no side effects.
///
/// Notifies only when the device may notify (admin session or a device
/// that hosted one), permission is granted, the app is not visible, and
/// the message did not come from the admin.
pub fn should_notify(message: &Message, eligibility: &NotificationEligibility, app_visible: bool) -> bool {
    let eligible_device = eligibility.is_admin_role || eligibility.is_marked_admin_device;
    eligible_device
        && eligibility.permission == PermissionState::Granted
        && !app_visible
        && !message.is_from_admin
}

/// Notification body: the text cut to a fixed number of characters, with a
/// trailing marker when something was cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(NOTIFICATION_PREVIEW_CHARS) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], NOTIFICATION_ELLIPSIS),
    }
}

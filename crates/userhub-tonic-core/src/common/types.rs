//! # Shared identifiers and defaults
//!
//! Identifier formats are part of the client-visible contract: users are
//! `user_<n>`, notifications within a stream are `notif_<seq>`, and finished
//! uploads are `upload_<user_id>_<unix_seconds>`.
//!
//! The feed defaults describe a slow publisher: a fixed number of
//! notifications, one per interval.

use core::time::Duration;

/// Prefix for identifiers allocated by the directory store.
pub const USER_ID_PREFIX: &str = "user_";

/// Prefix for notification identifiers; the suffix is the 1-based sequence
/// number within the stream.
pub const NOTIFICATION_ID_PREFIX: &str = "notif_";

/// Prefix for upload identifiers.
pub const UPLOAD_ID_PREFIX: &str = "upload_";

/// Number of notifications emitted by one `StreamNotifications` call.
pub const DEFAULT_NOTIFICATION_COUNT: usize = 10;

/// Pause between two consecutive notifications.
pub const DEFAULT_NOTIFICATION_INTERVAL: Duration = Duration::from_secs(1);

/// Formats the identifier of the `seq`-th notification of a stream.
pub fn notification_id(seq: usize) -> String {
    format!("{NOTIFICATION_ID_PREFIX}{seq}")
}

/// Formats the identifier of an upload completed at `unix_secs`.
pub fn upload_id(user_id: &str, unix_secs: u64) -> String {
    format!("{UPLOAD_ID_PREFIX}{user_id}_{unix_secs}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_identifiers() {
        assert_eq!(notification_id(1), "notif_1");
        assert_eq!(notification_id(10), "notif_10");
        assert_eq!(upload_id("user_1", 1_700_000_000), "upload_user_1_1700000000");
        assert_eq!(upload_id("", 5), "upload__5");
    }
}

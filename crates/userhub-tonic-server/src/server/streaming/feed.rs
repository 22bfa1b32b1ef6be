//! Paced notification feed for `StreamNotifications`.
//!
//! [`generate`] emits a fixed number of notifications for one subject, one
//! at a time and strictly in sequence order, pausing between emissions. The
//! cancellation token is checked before every emission and raced against
//! both the outbound send and the pause, so a cancelled call stops promptly
//! and never emits afterwards. Notifications already delivered stand.

use super::sleep::SleepProvider;
use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use userhub_tonic_core::{
    Error, Result,
    proto::{Notification, NotificationType},
    types::{DEFAULT_NOTIFICATION_COUNT, DEFAULT_NOTIFICATION_INTERVAL, notification_id},
};

/// Shape of a single feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Number of notifications emitted when the feed runs to completion.
    pub count: usize,
    /// Pause between two consecutive notifications.
    pub interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_NOTIFICATION_COUNT,
            interval: DEFAULT_NOTIFICATION_INTERVAL,
        }
    }
}

/// Destination for generated notifications.
pub trait NotificationSink: Send {
    /// Delivers one notification. A failure ends the feed.
    fn deliver(&mut self, notification: Notification) -> impl Future<Output = Result<()>> + Send;
}

impl NotificationSink for mpsc::Sender<core::result::Result<Notification, Status>> {
    fn deliver(&mut self, notification: Notification) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.send(Ok(notification))
                .await
                .map_err(|e| Error::ChannelError {
                    context: e.to_string(),
                })
        }
    }
}

/// The feed stopped before emitting every notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("feed stopped after {emitted} notification(s): {source}")]
pub struct FeedInterrupted {
    /// Notifications successfully delivered before the feed stopped.
    pub emitted: usize,
    /// Why the feed stopped.
    #[source]
    pub source: Error,
}

impl FeedInterrupted {
    const fn new(emitted: usize, source: Error) -> Self {
        Self { emitted, source }
    }
}

/// Streams `config.count` notifications for `subject_id` into `sink`.
///
/// Returns the number of notifications delivered.
///
/// # Errors
///
/// - [`Error::InvalidRequest`] with nothing emitted if `subject_id` is empty.
/// - [`Error::RequestCancelled`] if `cancel` fires; `emitted` counts what was
///   delivered before that.
/// - Whatever the sink reported if a delivery fails. No retry is attempted.
pub async fn generate<K, P>(
    subject_id: &str,
    sink: &mut K,
    cancel: &CancellationToken,
    config: &FeedConfig,
) -> core::result::Result<usize, FeedInterrupted>
where
    K: NotificationSink,
    P: SleepProvider,
{
    if subject_id.is_empty() {
        return Err(FeedInterrupted::new(
            0,
            Error::invalid("user_id is required"),
        ));
    }

    let mut emitted = 0;

    for seq in 1..=config.count {
        if cancel.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Feed for {subject_id} cancelled after {emitted} notifications");
            return Err(FeedInterrupted::new(emitted, Error::RequestCancelled));
        }

        let notification = build_notification(subject_id, seq);

        // A completed delivery is always counted. Cancellation only wins
        // while the delivery is still pending, and a pending mpsc send that
        // is dropped never enqueues its message.
        let delivered = tokio::select! {
            biased;
            delivered = sink.deliver(notification) => delivered,
            () = cancel.cancelled() => {
                return Err(FeedInterrupted::new(emitted, Error::RequestCancelled));
            }
        };

        if let Err(e) = delivered {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to send notification #{seq} to {subject_id}: {e}");
            return Err(FeedInterrupted::new(emitted, e));
        }

        emitted += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!("Sent notification #{seq} to {subject_id}");

        if seq < config.count {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(FeedInterrupted::new(emitted, Error::RequestCancelled));
                }
                () = P::sleep_for(config.interval) => {}
            }
        }
    }

    Ok(emitted)
}

fn build_notification(subject_id: &str, seq: usize) -> Notification {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();

    Notification {
        notification_id: notification_id(seq),
        user_id: subject_id.to_string(),
        title: format!("Notification #{seq}"),
        message: format!("This is notification number {seq} for user {subject_id}"),
        r#type: NotificationType::Info as i32,
        timestamp,
    }
}

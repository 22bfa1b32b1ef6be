use core::time::Duration;

/// Source of the pacing delay between two notifications.
///
/// Swapping the provider lets tests drive the feed without waiting on real
/// timers.
pub trait SleepProvider {
    /// We require `Send` so that the feed future can be spawned.
    type Sleep: Future<Output = ()> + Send;

    fn sleep_for(dur: Duration) -> Self::Sleep;
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the provider used by the running service.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

/// A [`SleepProvider`] that resolves immediately, ignoring the requested
/// duration.
pub struct NoSleep;
impl SleepProvider for NoSleep {
    type Sleep = core::future::Ready<()>;

    fn sleep_for(_dur: Duration) -> Self::Sleep {
        core::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn tokio_sleep_waits_for_the_duration() {
        let start = Instant::now();
        TokioSleep::sleep_for(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn no_sleep_does_not_advance_time() {
        let start = Instant::now();
        NoSleep::sleep_for(Duration::from_secs(5)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

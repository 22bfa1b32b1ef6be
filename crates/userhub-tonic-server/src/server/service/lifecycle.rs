use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use userhub_tonic_core::{Error, Result};

/// Tracks in-flight calls and coordinates shutdown.
///
/// Every call holds a [`CallGuard`] for its whole duration (for streams, until
/// the producing task exits). Once draining starts, new calls are refused
/// with [`Error::ServiceShutdown`]; calls still running when the drain
/// timeout elapses are cancelled through the shared token.
#[derive(Debug, Default)]
pub struct Lifecycle {
    shutdown_token: CancellationToken,
    draining: AtomicBool,
    inflight: AtomicUsize,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`Lifecycle::shutdown`] has
    /// started.
    pub fn begin(self: &Arc<Self>) -> Result<CallGuard> {
        // Count first: a concurrent `shutdown` either sees this call in the
        // drain or the call sees `draining` and backs out.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard {
            lifecycle: Arc::clone(self),
        };
        if self.draining.load(Ordering::SeqCst) {
            return Err(Error::ServiceShutdown);
        }
        Ok(guard)
    }

    /// A fresh token that is cancelled when the service stops.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Refuses new calls, waits up to `drain_timeout` for running calls to
    /// finish, then cancels whatever is left.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.draining.store(true, Ordering::SeqCst);

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let drained = timeout(drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        self.shutdown_token.cancel();
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct CallGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_track_inflight_calls() {
        let lifecycle = Arc::new(Lifecycle::new());
        let a = lifecycle.begin().unwrap();
        let b = lifecycle.begin().unwrap();
        assert_eq!(lifecycle.inflight(), 2);
        drop(a);
        assert_eq!(lifecycle.inflight(), 1);
        drop(b);
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test]
    async fn refuses_calls_after_shutdown() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.shutdown(Duration::from_millis(10)).await;

        assert!(lifecycle.is_shutting_down());
        assert_eq!(lifecycle.begin().unwrap_err(), Error::ServiceShutdown);
    }

    #[tokio::test]
    async fn refused_calls_are_not_counted() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.shutdown(Duration::from_millis(10)).await;

        for _ in 0..3 {
            assert!(lifecycle.begin().is_err());
        }
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_racing_shutdown_are_drained_or_refused() {
        let lifecycle = Arc::new(Lifecycle::new());
        let token = lifecycle.child_token();

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let token = token.clone();
                tokio::spawn(async move {
                    loop {
                        match lifecycle.begin() {
                            Ok(_guard) => {
                                assert!(
                                    !token.is_cancelled(),
                                    "admitted call was already cancelled"
                                );
                                tokio::task::yield_now().await;
                            }
                            Err(e) => break e,
                        }
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        lifecycle.shutdown(Duration::from_secs(5)).await;

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Error::ServiceShutdown);
        }
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancels_calls_that_outlive_the_drain_timeout() {
        let lifecycle = Arc::new(Lifecycle::new());
        let token = lifecycle.child_token();

        let call = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                let _guard = lifecycle.begin().unwrap();
                token.cancelled().await;
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(lifecycle.inflight(), 1);

        lifecycle.shutdown(Duration::from_secs(3)).await;
        call.await.unwrap();
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_calls_that_finish_in_time() {
        let lifecycle = Arc::new(Lifecycle::new());
        let token = lifecycle.child_token();

        let call = {
            let lifecycle = Arc::clone(&lifecycle);
            let token = token.clone();
            tokio::spawn(async move {
                let _guard = lifecycle.begin().unwrap();
                sleep(Duration::from_secs(1)).await;
                token.is_cancelled()
            })
        };
        tokio::task::yield_now().await;

        lifecycle.shutdown(Duration::from_secs(3)).await;
        assert!(!call.await.unwrap(), "call was cancelled before draining");
        assert!(token.is_cancelled());
    }
}

//! Periodic background loops with explicit start/stop.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::IndexerError;
use crate::domain::order::OrderError;
use crate::resilience::ResilienceError;

/// Errors from the background services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// `start` was called on a running service.
    #[error("{service} is already running")]
    AlreadyRunning {
        /// Service name.
        service: &'static str,
    },

    /// Indexer fetch failed.
    #[error(transparent)]
    Indexer(#[from] ResilienceError<IndexerError>),

    /// Ledger access failed.
    #[error(transparent)]
    Ledger(#[from] OrderError),
}

#[derive(Debug)]
struct Running {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// One periodic loop: tick immediately, then every `interval` until stopped.
#[derive(Debug)]
pub struct BackgroundLoop {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl BackgroundLoop {
    /// Create a stopped loop.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    /// Spawn the loop. It also exits when `parent` is cancelled.
    pub fn start<F, Fut>(
        &self,
        parent: &CancellationToken,
        interval: Duration,
        mut tick: F,
    ) -> Result<(), ServiceError>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(ServiceError::AlreadyRunning { service: self.name });
        }

        let stop = parent.child_token();
        let token = stop.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(service = name, interval_ms = interval.as_millis() as u64, "Background loop started");

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => tick(token.clone()).await,
                }
            }
            tracing::info!(service = name, "Background loop stopped");
        });

        *running = Some(Running { stop, handle });
        Ok(())
    }

    /// Signal the loop and wait until it has exited.
    pub async fn stop(&self) {
        let Some(Running { stop, handle }) = self.running.lock().take() else {
            return;
        };
        stop.cancel();
        if let Err(e) = handle.await {
            tracing::error!(service = self.name, error = %e, "Background loop panicked");
        }
    }

    /// Returns true while the loop task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_on_interval() {
        let ticks = Arc::new(AtomicU32::new(0));
        let worker = BackgroundLoop::new("test");
        let counter = Arc::clone(&ticks);
        worker
            .start(&CancellationToken::new(), Duration::from_secs(10), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        worker.stop().await;
        assert!(!worker.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let worker = BackgroundLoop::new("test");
        let parent = CancellationToken::new();
        worker
            .start(&parent, Duration::from_secs(1), |_| async {})
            .unwrap();
        assert!(matches!(
            worker.start(&parent, Duration::from_secs(1), |_| async {}),
            Err(ServiceError::AlreadyRunning { service: "test" })
        ));
        worker.stop().await;
        worker
            .start(&parent, Duration::from_secs(1), |_| async {})
            .unwrap();
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_ends_loop() {
        let worker = BackgroundLoop::new("test");
        let parent = CancellationToken::new();
        worker
            .start(&parent, Duration::from_secs(1), |_| async {})
            .unwrap();
        assert!(worker.is_running());

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!worker.is_running());
        worker.stop().await;
    }
}

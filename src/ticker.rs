// ABOUTME: Periodic or one-shot background timer used for timeout sweeps, heartbeats and reconnect backoff
// ABOUTME: Grounded in the teacher's KeepAliveManager polling timer, adapted to a tokio::spawn-driven background task

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A background timer that calls a closure repeatedly (or once) on a
/// dedicated task, with a `destroy` that stops the timer and joins it.
///
/// Used for: the async client's outstanding-call sweep (every
/// [`crate::datatypes::TIMEOUT_SWEEP_INTERVAL_MS`]), the sync client's
/// per-call deadline (single-shot), and the subscriber's optional heartbeat
/// (every [`crate::datatypes::HEARTBEAT_INTERVAL_MS`]).
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Run `callback` once every `period`, starting after the first `period`
    /// elapses (matching `tokio::time::interval`'s default tick behavior).
    pub fn repeating<F, Fut>(period: Duration, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let callback = Arc::new(callback);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                callback().await;
            }
        });
        Ticker { handle: Some(handle) }
    }

    /// Run `callback` exactly once, after `delay`.
    pub fn once<F, Fut>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback().await;
        });
        Ticker { handle: Some(handle) }
    }

    /// Stop the timer and release its task. Idempotent.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn repeating_ticker_fires_multiple_times() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let ticker = Ticker::repeating(Duration::from_millis(10), move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(55)).await;
        drop(ticker);
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn destroy_stops_further_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let mut ticker = Ticker::repeating(Duration::from_millis(10), move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(25)).await;
        ticker.destroy();
        let observed = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), observed);
    }

    #[tokio::test]
    async fn one_shot_fires_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let _ticker = Ticker::once(Duration::from_millis(10), move || async move {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

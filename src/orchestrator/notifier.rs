//! Debounced "refresh display" notifications

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::orchestrator::events::{EventBus, PipelineEvent};

/// Coalesces refresh requests into at most one [`PipelineEvent::RefreshDisplay`]
/// per scope per interval
///
/// The first request for an idle scope opens a window; requests arriving
/// inside the window are absorbed, and a single event fires when it closes.
pub struct RefreshNotifier {
    interval_ms: AtomicU64,
    pending: Mutex<HashSet<String>>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl RefreshNotifier {
    pub fn new(interval: Duration, events: Arc<EventBus>, cancel: CancellationToken) -> Self {
        Self {
            interval_ms: AtomicU64::new(interval.as_millis() as u64),
            pending: Mutex::new(HashSet::new()),
            events,
            cancel,
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Applies to windows opened after the call
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Ask for a refresh of `scope`
    pub fn request(self: &Arc<Self>, scope: &str) {
        if self.cancel.is_cancelled() || !self.lock_pending().insert(scope.to_string()) {
            return;
        }

        let notifier = Arc::clone(self);
        let scope = scope.to_string();
        let interval = self.interval();

        tokio::spawn(async move {
            tokio::select! {
                _ = notifier.cancel.cancelled() => {}
                _ = sleep(interval) => {
                    notifier.lock_pending().remove(&scope);
                    debug!("Refreshing display for {}", scope);
                    notifier.events.emit(PipelineEvent::RefreshDisplay { scope });
                }
            }
        });
    }

    /// Scopes with a window currently open
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn refresh(scope: &str) -> PipelineEvent {
        PipelineEvent::RefreshDisplay {
            scope: scope.to_string(),
        }
    }

    fn notifier(interval_ms: u64) -> (Arc<RefreshNotifier>, Arc<EventBus>, CancellationToken) {
        let events = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let notifier = Arc::new(RefreshNotifier::new(
            Duration::from_millis(interval_ms),
            Arc::clone(&events),
            cancel.clone(),
        ));
        (notifier, events, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_requests_coalesces_into_one_event() {
        let (notifier, events, _cancel) = notifier(200);
        let mut subscription = events.subscribe();
        let started = Instant::now();

        for _ in 0..10 {
            notifier.request("doc");
            sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(subscription.events.recv().await, Some(refresh("doc")));
        assert!(started.elapsed() >= Duration::from_millis(200));

        sleep(Duration::from_secs(1)).await;
        assert!(subscription.events.try_recv().is_err());
        assert_eq!(notifier.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_events_are_at_least_one_interval_apart() {
        let (notifier, events, _cancel) = notifier(200);
        let mut subscription = events.subscribe();

        notifier.request("doc");
        subscription.events.recv().await;
        let first = Instant::now();

        notifier.request("doc");
        subscription.events.recv().await;

        assert!(first.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn scopes_are_debounced_independently() {
        let (notifier, events, _cancel) = notifier(200);
        let mut subscription = events.subscribe();

        notifier.request("a");
        notifier.request("b");
        notifier.request("a");

        let mut received = vec![
            subscription.events.recv().await.unwrap(),
            subscription.events.recv().await.unwrap(),
        ];
        received.sort_by_key(|event| format!("{:?}", event));

        assert_eq!(received, vec![refresh("a"), refresh("b")]);
        sleep(Duration::from_secs(1)).await;
        assert!(subscription.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_notifier_emits_nothing() {
        let (notifier, events, cancel) = notifier(200);
        let mut subscription = events.subscribe();

        notifier.request("doc");
        cancel.cancel();
        notifier.request("other");

        sleep(Duration::from_secs(1)).await;
        assert!(subscription.events.try_recv().is_err());
    }

    #[test]
    fn set_interval_updates_interval() {
        let (notifier, _events, _cancel) = notifier(200);
        notifier.set_interval(Duration::from_millis(50));
        assert_eq!(notifier.interval(), Duration::from_millis(50));
    }
}

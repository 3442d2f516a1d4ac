//! Bounded-concurrency request queue with retry and cooperative cancellation
//!
//! Work items are admitted in FIFO order, at most `max_concurrent` at a time.
//! An admitted item holds its slot until its work settles; the queue never
//! preempts running work. Transient failures are retried with exponential
//! backoff (see [`retry`]).

pub mod retry;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::QueueConfig;
pub use retry::{RetryPolicy, TransientError};

#[derive(Debug, Error)]
pub enum QueueError<E> {
    #[error("Request cancelled")]
    Cancelled,

    #[error("Request failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> QueueError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}

/// Signal handed to a waiting item when it leaves the waiting list
enum Admission {
    Run,
    Aborted,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<oneshot::Sender<Admission>>,
    running: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    max_concurrent: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot now if one is free and nobody is ahead, otherwise join the line
    fn admit_or_wait(&self) -> Option<oneshot::Receiver<Admission>> {
        let mut state = self.lock();
        if state.running < self.max_concurrent && state.waiting.is_empty() {
            state.running += 1;
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.waiting.push_back(tx);
        Some(rx)
    }

    /// Free a slot and hand it to the oldest waiter still listening
    fn release(&self) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        while let Some(next) = state.waiting.pop_front() {
            if next.send(Admission::Run).is_ok() {
                state.running += 1;
                break;
            }
        }
    }
}

/// Releases the slot held by an admitted item, even if its work panics
struct Slot(Arc<Shared>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Bounded-concurrency executor for asynchronous work items
pub struct RequestQueue {
    shared: Arc<Shared>,
    retry: RetryPolicy,
}

impl RequestQueue {
    pub fn new(max_concurrent: usize, retry: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                max_concurrent: max_concurrent.max(1),
            }),
            retry,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.max_concurrent,
            RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.base_retry_delay_ms),
            ),
        )
    }

    /// Submit a unit of work.
    ///
    /// The item is registered immediately; the returned [`QueuedTask`] settles
    /// exactly once with the work's value, `Failed` once retries are exhausted
    /// or the failure is permanent, or `Cancelled` when `cancel` fires before
    /// admission, during a backoff wait, or before a failed attempt is retried.
    pub fn enqueue<T, E, F, Fut>(
        &self,
        work: F,
        cancel: Option<CancellationToken>,
    ) -> QueuedTask<T, E>
    where
        T: Send + 'static,
        E: TransientError + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cancel = cancel.unwrap_or_default();
        let waiter = self.shared.admit_or_wait();
        let shared = Arc::clone(&self.shared);
        let retry = self.retry;
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = run_item(shared, waiter, retry, cancel, work).await;
            let _ = tx.send(result);
        });

        QueuedTask { rx }
    }

    /// Reject every item that has not been admitted yet.
    ///
    /// Running items are left alone; cancel them through their own tokens.
    pub fn abort_all(&self) {
        let drained: Vec<_> = self.shared.lock().waiting.drain(..).collect();
        if !drained.is_empty() {
            info!("Aborting {} queued request(s)", drained.len());
        }
        for waiter in drained {
            let _ = waiter.send(Admission::Aborted);
        }
    }

    /// Items waiting for a slot
    pub fn queue_len(&self) -> usize {
        self.shared.lock().waiting.len()
    }

    /// Items admitted and not yet settled
    pub fn running_count(&self) -> usize {
        self.shared.lock().running
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

async fn run_item<T, E, F, Fut>(
    shared: Arc<Shared>,
    waiter: Option<oneshot::Receiver<Admission>>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    work: F,
) -> Result<T, QueueError<E>>
where
    E: TransientError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(waiter) = waiter {
        match waiter.await {
            Ok(Admission::Run) => {}
            Ok(Admission::Aborted) | Err(_) => return Err(QueueError::Cancelled),
        }
    }

    let _slot = Slot(shared);

    if cancel.is_cancelled() {
        debug!("Request cancelled before it started");
        return Err(QueueError::Cancelled);
    }

    retry::run_with_retry(retry, &cancel, work).await
}

/// Handle to a submitted work item; resolves when the item settles
#[must_use = "a queued task does nothing observable unless awaited"]
pub struct QueuedTask<T, E> {
    rx: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> Future for QueuedTask<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(QueueError::Cancelled)))
    }
}

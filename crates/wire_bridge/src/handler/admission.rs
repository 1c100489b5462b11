//! Admission control for outgoing requests.
//!
//! At most `max_concurrent` requests are in flight. A caller that finds no
//! free slot joins a FIFO wait queue, but only while fewer than `queue_limit`
//! callers are already waiting; otherwise it fails fast with `QUEUE_FULL`.
//! A queued caller gives up with `CONCURRENCY_LIMIT` after its own request
//! timeout, and closing the admission fails everyone with `SHUTTING_DOWN`.

use crate::error::{ErrorCode, ProtocolError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

pub(crate) struct Admission {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    queue_limit: usize,
    waiting: AtomicUsize,
}

/// Leaves the wait queue when dropped, including on cancellation.
struct QueuePosition<'a>(&'a AtomicUsize);

impl Drop for QueuePosition<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Admission {
    pub(crate) fn new(max_concurrent: usize, queue_limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            queue_limit,
            waiting: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn acquire(
        &self,
        max_wait: Duration,
    ) -> Result<OwnedSemaphorePermit, ProtocolError> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(shutting_down()),
            Err(TryAcquireError::NoPermits) => {}
        }

        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.queue_limit {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(ProtocolError::with_code(
                ErrorCode::QueueFull,
                format!(
                    "Request queue is full ({} in flight, {} waiting)",
                    self.max_concurrent, self.queue_limit
                ),
            ));
        }
        let _position = QueuePosition(&self.waiting);

        match tokio::time::timeout(max_wait, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(shutting_down()),
            Err(_) => Err(ProtocolError::with_code(
                ErrorCode::ConcurrencyLimit,
                format!(
                    "No request slot became free within {}ms ({} in flight)",
                    max_wait.as_millis(),
                    self.max_concurrent
                ),
            )),
        }
    }

    /// Refuses all current and future callers.
    pub(crate) fn close(&self) {
        self.slots.close();
    }

    pub(crate) fn active(&self) -> usize {
        self.max_concurrent.saturating_sub(self.slots.available_permits())
    }

    pub(crate) fn queued(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

fn shutting_down() -> ProtocolError {
    ProtocolError::with_code(ErrorCode::ShuttingDown, "Handler is shutting down")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_full_fails_fast() {
        let admission = Admission::new(1, 0);
        let _held = admission.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(admission.active(), 1);

        let err = admission.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::QueueFull));
    }

    #[tokio::test]
    async fn test_queued_caller_is_served_when_slot_frees() {
        let admission = Arc::new(Admission::new(1, 1));
        let held = admission.acquire(Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let admission = Arc::clone(&admission);
            tokio::spawn(async move { admission.acquire(Duration::from_secs(5)).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(admission.queued(), 1);

        // A third caller finds the queue full
        let err = admission.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::QueueFull));

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(admission.queued(), 0);
    }

    #[tokio::test]
    async fn test_queued_caller_times_out() {
        let admission = Admission::new(1, 5);
        let _held = admission.acquire(Duration::from_secs(1)).await.unwrap();
        let err = admission.acquire(Duration::from_millis(30)).await.unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::ConcurrencyLimit));
        assert_eq!(admission.queued(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_waiters() {
        let admission = Arc::new(Admission::new(1, 5));
        let _held = admission.acquire(Duration::from_secs(1)).await.unwrap();
        let waiter = {
            let admission = Arc::clone(&admission);
            tokio::spawn(async move { admission.acquire(Duration::from_secs(5)).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        admission.close();
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::ShuttingDown));
        let err = admission.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::ShuttingDown));
    }
}

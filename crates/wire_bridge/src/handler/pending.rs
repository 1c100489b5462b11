//! Bookkeeping for outgoing requests awaiting their response.
//!
//! Every entry is settled at most once: whoever removes it from the table
//! (matching response, timer, sweep or shutdown) is the only one that can
//! resolve the caller.

use crate::error::{ErrorCode, ProtocolError};
use crate::message::Response;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::JoinHandle;

pub(crate) type RequestOutcome = Result<Response, ProtocolError>;

pub(crate) struct PendingRequest {
    pub(crate) id: String,
    pub(crate) operation: String,
    pub(crate) created_at: Instant,
    pub(crate) timeout: Duration,
    resolver: oneshot::Sender<RequestOutcome>,
    timer: Option<JoinHandle<()>>,
    /// Admission slot, released when the entry is dropped
    _permit: Option<OwnedSemaphorePermit>,
}

impl PendingRequest {
    pub(crate) fn new(
        id: impl Into<String>,
        operation: impl Into<String>,
        timeout: Duration,
        resolver: oneshot::Sender<RequestOutcome>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            created_at: Instant::now(),
            timeout,
            resolver,
            timer: None,
            _permit: permit,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.timeout
    }

    /// Cancels the timer and hands the outcome to the waiting caller.
    ///
    /// Returns false when the caller stopped waiting.
    fn settle(self, outcome: RequestOutcome) -> bool {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.resolver.send(outcome).is_ok()
    }
}

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: DashMap<String, PendingRequest>,
}

impl PendingTable {
    pub(crate) fn insert(&self, request: PendingRequest) {
        self.entries.insert(request.id.clone(), request);
    }

    /// Attaches the timeout timer; aborts it if the entry is already gone.
    pub(crate) fn attach_timer(&self, id: &str, timer: JoinHandle<()>) {
        match self.entries.get_mut(id) {
            Some(mut entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Detaches the timer of `id`, leaving the entry to the cleanup sweep.
    #[cfg(test)]
    pub(crate) fn take_timer(&self, id: &str) -> Option<JoinHandle<()>> {
        self.entries.get_mut(id)?.timer.take()
    }

    /// Settles the request `response` answers. Returns its operation, or
    /// `None` when no such request is pending.
    pub(crate) fn resolve(&self, response: Response) -> Option<String> {
        let (_, pending) = self.entries.remove(&response.request_id)?;
        let operation = pending.operation.clone();
        let outcome = if response.success {
            Ok(response)
        } else {
            let text = response.error.clone().unwrap_or_else(|| "Unknown error".to_string());
            Err(ProtocolError::with_code(ErrorCode::RemoteError, text)
                .for_message(response.request_id.clone()))
        };
        pending.settle(outcome);
        Some(operation)
    }

    /// Rejects one request. Returns false when it was no longer pending.
    pub(crate) fn reject(&self, id: &str, error: ProtocolError) -> bool {
        match self.entries.remove(id) {
            Some((_, pending)) => {
                pending.settle(Err(error));
                true
            }
            None => false,
        }
    }

    /// Ids of requests older than their own timeout.
    pub(crate) fn expired_ids(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Rejects every pending request with a copy of `error`, returning how many there were.
    pub(crate) fn reject_all(&self, error: &ProtocolError) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut rejected = 0;
        for id in ids {
            if self.reject(&id, error.clone().for_message(id.clone())) {
                rejected += 1;
            }
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{create_response, ResponseOptions};
    use serde_json::json;

    fn pending(id: &str, timeout: Duration) -> (PendingRequest, oneshot::Receiver<RequestOutcome>) {
        let (tx, rx) = oneshot::channel();
        (PendingRequest::new(id, "player.kick", timeout, tx, None), rx)
    }

    #[tokio::test]
    async fn test_resolve_settles_once() {
        let table = PendingTable::default();
        let (entry, rx) = pending("req-1", Duration::from_secs(5));
        table.insert(entry);

        let response =
            create_response("req-1", "player.kick", json!({}), ResponseOptions::default());
        assert_eq!(table.resolve(response.clone()).as_deref(), Some("player.kick"));
        assert!(table.resolve(response).is_none());
        assert!(rx.await.unwrap().is_ok());
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_response_rejects() {
        let table = PendingTable::default();
        let (entry, rx) = pending("req-2", Duration::from_secs(5));
        table.insert(entry);

        let response = create_response(
            "req-2",
            "player.kick",
            json!({}),
            ResponseOptions {
                success: false,
                error: Some("player offline".into()),
                server_id: None,
            },
        );
        table.resolve(response);
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::RemoteError));
        assert_eq!(err.message, "player offline");
    }

    #[tokio::test]
    async fn test_expired_ids_and_reject_all() {
        let table = PendingTable::default();
        let (short, short_rx) = pending("short", Duration::from_millis(5));
        let (long, long_rx) = pending("long", Duration::from_secs(60));
        table.insert(short);
        table.insert(long);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(table.expired_ids(Instant::now()), vec!["short".to_string()]);

        let error = ProtocolError::with_code(ErrorCode::ShuttingDown, "Handler is shutting down");
        assert_eq!(table.reject_all(&error), 2);
        assert_eq!(short_rx.await.unwrap().unwrap_err().code, Some(ErrorCode::ShuttingDown));
        let err = long_rx.await.unwrap().unwrap_err();
        assert_eq!(err.message_id.as_deref(), Some("long"));
    }

    #[tokio::test]
    async fn test_attach_timer_to_missing_entry_aborts_it() {
        let table = PendingTable::default();
        let timer = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });
        table.attach_timer("gone", timer);
        assert!(!table.contains("gone"));
    }
}

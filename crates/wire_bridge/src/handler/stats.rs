//! Handler statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of handler activity, for dashboards and the host monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerStats {
    /// Outgoing requests awaiting a response
    pub pending_requests: usize,
    /// Admission slots currently held
    pub active_requests: usize,
    /// Callers waiting for an admission slot
    pub queued_requests: usize,
    pub max_concurrent_requests: usize,
    pub request_handlers: usize,
    pub event_handlers: usize,
    pub system_handlers: usize,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub requests_completed: u64,
    pub requests_failed: u64,
    pub requests_timed_out: u64,
    /// Responses that matched no pending request
    pub responses_dropped: u64,
    /// Inbound frames that could not be decoded or validated
    pub rejected_messages: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) messages_sent: AtomicU64,
    pub(crate) messages_received: AtomicU64,
    pub(crate) requests_completed: AtomicU64,
    pub(crate) requests_failed: AtomicU64,
    pub(crate) requests_timed_out: AtomicU64,
    pub(crate) responses_dropped: AtomicU64,
    pub(crate) rejected_messages: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut HandlerStats) {
        stats.messages_sent = self.messages_sent.load(Ordering::Relaxed);
        stats.messages_received = self.messages_received.load(Ordering::Relaxed);
        stats.requests_completed = self.requests_completed.load(Ordering::Relaxed);
        stats.requests_failed = self.requests_failed.load(Ordering::Relaxed);
        stats.requests_timed_out = self.requests_timed_out.load(Ordering::Relaxed);
        stats.responses_dropped = self.responses_dropped.load(Ordering::Relaxed);
        stats.rejected_messages = self.rejected_messages.load(Ordering::Relaxed);
    }
}

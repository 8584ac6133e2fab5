//! Embargo queue
//!
//! Bounded time-window request batcher. The first submission opens a
//! window; until it elapses the batch only accumulates. When flushed
//! after expiry, the whole batch comes out in deterministic order —
//! arrival time, then agent id — which strips network-latency ordering
//! bias from the arbitration round.
//!
//! Re-submitting a request id replaces the payload but keeps the
//! original arrival position, so resubmission cannot be used to jump
//! the queue in either direction.

use serde::{Deserialize, Serialize};

/// One batched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbargoEntry {
    /// Stable request identity; resubmission key.
    pub request_id: String,

    /// Submitting agent.
    pub agent_id: String,

    /// Millicredits the agent offers to burn this round.
    pub burn_mc: i64,

    /// Arrival time (ms) of the *first* submission under this id.
    pub arrival_ms: u64,
}

/// Time-window request batcher.
///
/// # Example
/// ```
/// use arbitration_core::EmbargoQueue;
///
/// let mut queue = EmbargoQueue::new(50);
/// queue.submit("r1".to_string(), "agent-b".to_string(), 0, 1_000);
/// queue.submit("r2".to_string(), "agent-a".to_string(), 0, 1_000);
///
/// // Window still open: nothing comes out.
/// assert!(queue.flush(1_040).is_empty());
///
/// // Window elapsed: whole batch, deterministic order.
/// let batch = queue.flush(1_050);
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch[0].agent_id, "agent-a");
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct EmbargoQueue {
    window_ms: u64,
    window_opened_ms: Option<u64>,
    entries: Vec<EmbargoEntry>,
}

impl EmbargoQueue {
    /// Create a queue holding batches for `window_ms` milliseconds.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            window_opened_ms: None,
            entries: Vec::new(),
        }
    }

    /// The configured window length.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Submit (or replace) a request.
    ///
    /// The first submission into an empty queue opens the window. A
    /// repeated request id replaces the stored payload but keeps its
    /// original arrival.
    pub fn submit(&mut self, request_id: String, agent_id: String, burn_mc: i64, now_ms: u64) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.request_id == request_id)
        {
            existing.agent_id = agent_id;
            existing.burn_mc = burn_mc;
            return;
        }
        if self.entries.is_empty() {
            self.window_opened_ms = Some(now_ms);
        }
        self.entries.push(EmbargoEntry {
            request_id,
            agent_id,
            burn_mc,
            arrival_ms: now_ms,
        });
    }

    /// Whether the current window has elapsed.
    pub fn window_elapsed(&self, now_ms: u64) -> bool {
        match self.window_opened_ms {
            Some(opened) => now_ms.saturating_sub(opened) >= self.window_ms,
            None => false,
        }
    }

    /// Emit the batch if the window has elapsed; empty otherwise.
    ///
    /// Flushing is idempotent: a second flush without new submissions
    /// returns nothing.
    pub fn flush(&mut self, now_ms: u64) -> Vec<EmbargoEntry> {
        if self.entries.is_empty() || !self.window_elapsed(now_ms) {
            return Vec::new();
        }
        self.window_opened_ms = None;
        let mut batch = std::mem::take(&mut self.entries);
        batch.sort_by(|a, b| {
            a.arrival_ms
                .cmp(&b.arrival_ms)
                .then(a.agent_id.cmp(&b.agent_id))
                .then(a.request_id.cmp(&b.request_id))
        });
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_holds_batch() {
        let mut queue = EmbargoQueue::new(50);
        queue.submit("r1".to_string(), "a".to_string(), 0, 100);
        assert!(queue.flush(120).is_empty());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush(150).len(), 1);
    }

    #[test]
    fn test_flush_orders_by_arrival_then_agent() {
        let mut queue = EmbargoQueue::new(10);
        queue.submit("r1".to_string(), "zed".to_string(), 0, 100);
        queue.submit("r2".to_string(), "abe".to_string(), 0, 100);
        queue.submit("r3".to_string(), "mia".to_string(), 0, 101);
        let batch = queue.flush(200);
        let agents: Vec<&str> = batch.iter().map(|e| e.agent_id.as_str()).collect();
        assert_eq!(agents, vec!["abe", "zed", "mia"]);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut queue = EmbargoQueue::new(10);
        queue.submit("r1".to_string(), "a".to_string(), 0, 100);
        assert_eq!(queue.flush(200).len(), 1);
        assert!(queue.flush(200).is_empty());
        assert!(queue.flush(300).is_empty());
    }

    #[test]
    fn test_resubmission_replaces_payload_keeps_arrival() {
        let mut queue = EmbargoQueue::new(10);
        queue.submit("r1".to_string(), "a".to_string(), 100, 100);
        queue.submit("r2".to_string(), "b".to_string(), 0, 105);
        queue.submit("r1".to_string(), "a".to_string(), 900, 108);
        let batch = queue.flush(200);
        assert_eq!(batch.len(), 2);
        // r1 keeps its original position (arrival 100) with new payload.
        assert_eq!(batch[0].request_id, "r1");
        assert_eq!(batch[0].burn_mc, 900);
        assert_eq!(batch[0].arrival_ms, 100);
    }

    #[test]
    fn test_new_window_opens_after_flush() {
        let mut queue = EmbargoQueue::new(50);
        queue.submit("r1".to_string(), "a".to_string(), 0, 100);
        queue.flush(150);
        queue.submit("r2".to_string(), "a".to_string(), 0, 160);
        // New window opened at 160; 170 is too early.
        assert!(queue.flush(170).is_empty());
        assert_eq!(queue.flush(210).len(), 1);
    }
}

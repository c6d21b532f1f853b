//! Relay queue — in-memory FIFO between the poller and the consumer.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use super::types::Message;

/// Unbounded FIFO of fetched messages.
///
/// No deduplication happens here; the consumer's deduplicator does that.
/// `dequeue` waits with a timeout so the consumer can re-check its stop
/// signal instead of blocking forever on an empty queue.
pub struct RelayQueue {
    items: Mutex<VecDeque<Message>>,
    available: Notify,
}

impl RelayQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Append a message and wake a waiting consumer.
    pub async fn enqueue(&self, message: Message) {
        self.items.lock().await.push_back(message);
        self.available.notify_one();
    }

    /// Pop the oldest message, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = self.items.lock().await.pop_front() {
                return Some(message);
            }
            // notify_one stores a permit when nobody is waiting, so an
            // enqueue between the check above and this await is not lost.
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return self.items.lock().await.pop_front();
            }
        }
    }

    /// Number of queued messages.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Check if the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

//! Deduplicator — remembers the `posted_at` of the last relayed message.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::Message;

/// Last-relayed marker for one relay run.
///
/// Created fresh by the controller for every run, so a restart resets it.
/// The marker only moves after a successful publish.
#[derive(Default)]
pub struct Deduplicator {
    marker: RwLock<Option<DateTime<Utc>>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// False iff `message.posted_at` equals the stored marker.
    pub async fn should_process(&self, message: &Message) -> bool {
        *self.marker.read().await != Some(message.posted_at)
    }

    /// Record `message` as relayed.
    pub async fn mark_processed(&self, message: &Message) {
        *self.marker.write().await = Some(message.posted_at);
    }

    /// Current marker value.
    pub async fn marker(&self) -> Option<DateTime<Utc>> {
        *self.marker.read().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn msg(secs: i64) -> Message {
        Message::new(Utc.timestamp_opt(secs, 0).unwrap(), "text")
    }

    #[tokio::test]
    async fn unset_marker_processes_everything() {
        let dedup = Deduplicator::new();
        assert!(dedup.marker().await.is_none());
        assert!(dedup.should_process(&msg(1)).await);
    }

    #[tokio::test]
    async fn same_timestamp_is_skipped_after_mark() {
        let dedup = Deduplicator::new();
        let m = msg(100);
        dedup.mark_processed(&m).await;
        assert!(!dedup.should_process(&m).await);
        // Different text, same timestamp: still the same message.
        let edited = Message::new(m.posted_at, "edited");
        assert!(!dedup.should_process(&edited).await);
    }

    #[tokio::test]
    async fn newer_message_is_processed() {
        let dedup = Deduplicator::new();
        dedup.mark_processed(&msg(100)).await;
        assert!(dedup.should_process(&msg(101)).await);
        dedup.mark_processed(&msg(101)).await;
        assert_eq!(dedup.marker().await, Some(msg(101).posted_at));
    }
}

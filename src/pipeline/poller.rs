//! Source poller — periodically enqueues the latest source message.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::channels::SharedChannelClient;
use crate::pipeline::queue::RelayQueue;
use crate::pipeline::signal::StopSignal;

/// Spawn the poller for one relay run.
///
/// The first fetch happens immediately, then once per `interval`. The
/// loop exits promptly when `stop` is raised, even mid-sleep.
pub fn spawn_poller(
    client: SharedChannelClient,
    source: String,
    queue: Arc<RelayQueue>,
    stop: StopSignal,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(source = %source, interval_secs = interval.as_secs(), "Source poller started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.wait() => break,
            }
            if stop.is_set() {
                break;
            }
            poll_once(&client, &source, &queue).await;
        }

        info!(source = %source, "Source poller stopped");
    })
}

/// One fetch-and-enqueue cycle. Returns whether a message was enqueued.
///
/// Fetch errors are logged and swallowed; the next tick retries.
pub async fn poll_once(client: &SharedChannelClient, source: &str, queue: &RelayQueue) -> bool {
    match client.fetch_latest(source).await {
        Ok(Some(message)) => {
            debug!(source = %source, posted_at = %message.posted_at, "Fetched latest message");
            queue.enqueue(message).await;
            true
        }
        Ok(None) => {
            debug!(source = %source, "Source channel has no messages yet");
            false
        }
        Err(e) => {
            warn!(source = %source, error = %e, "Failed to fetch latest message");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::channels::{ChannelClient, ChannelHandle};
    use crate::error::ChannelError;
    use crate::pipeline::types::Message;

    /// Returns the same latest message on every fetch, failing every
    /// `fail_every`-th call.
    struct StaticSource {
        fetches: Arc<AtomicUsize>,
        fail_every: usize,
    }

    #[async_trait]
    impl ChannelClient for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn connect(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn resolve_channel(
            &mut self,
            identifier: &str,
        ) -> Result<ChannelHandle, ChannelError> {
            Ok(ChannelHandle {
                identifier: identifier.to_string(),
                chat_id: -1,
            })
        }

        async fn fetch_latest(
            &mut self,
            channel: &ChannelHandle,
        ) -> Result<Option<Message>, ChannelError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(ChannelError::FetchFailed {
                    identifier: channel.identifier.clone(),
                    reason: "timeout".into(),
                });
            }
            Ok(Some(Message::new(Utc.timestamp_opt(42, 0).unwrap(), "latest")))
        }

        async fn send(&mut self, _channel: &ChannelHandle, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn source(fail_every: usize) -> (SharedChannelClient, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let client = SharedChannelClient::new(StaticSource {
            fetches: Arc::clone(&fetches),
            fail_every,
        });
        (client, fetches)
    }

    #[tokio::test]
    async fn poll_once_enqueues_latest() {
        let (client, _) = source(0);
        let queue = RelayQueue::new();
        assert!(poll_once(&client, "@src", &queue).await);
        assert!(poll_once(&client, "@src", &queue).await);
        // Same message twice: the queue does not deduplicate.
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn poll_once_swallows_fetch_errors() {
        let (client, _) = source(1);
        let queue = RelayQueue::new();
        assert!(!poll_once(&client, "@src", &queue).await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn poller_fetches_immediately_and_stops_mid_sleep() {
        let (client, fetches) = source(0);
        let queue = Arc::new(RelayQueue::new());
        let stop = StopSignal::new();

        let handle = spawn_poller(
            client,
            "@src".into(),
            Arc::clone(&queue),
            stop.clone(),
            Duration::from_secs(3600),
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.is_empty().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first fetch should happen immediately");

        stop.set();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller should exit without waiting out the interval")
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poller_keeps_running_after_errors() {
        let (client, fetches) = source(2);
        let queue = Arc::new(RelayQueue::new());
        let stop = StopSignal::new();

        let handle = spawn_poller(
            client,
            "@src".into(),
            Arc::clone(&queue),
            stop.clone(),
            Duration::from_millis(10),
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while fetches.load(Ordering::SeqCst) < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poller should keep fetching");

        stop.set();
        handle.await.unwrap();
        assert!(queue.len().await >= 2);
    }
}

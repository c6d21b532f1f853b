//! Relay consumer — drains the queue through dedup, classify, rewrite, publish.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::pipeline::classify::Classifier;
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::publisher::Publisher;
use crate::pipeline::queue::RelayQueue;
use crate::pipeline::rewrite::Rewriter;
use crate::pipeline::signal::StopSignal;
use crate::pipeline::types::{Message, RelayOutcome, RelayRequest};

/// The processing half of one relay run.
pub struct Relay {
    classifier: Arc<Classifier>,
    rewriter: Arc<Rewriter>,
    publisher: Publisher,
    dedup: Arc<Deduplicator>,
    destination: String,
    audience_name: String,
}

impl Relay {
    pub fn new(
        classifier: Arc<Classifier>,
        rewriter: Arc<Rewriter>,
        publisher: Publisher,
        dedup: Arc<Deduplicator>,
        request: &RelayRequest,
    ) -> Self {
        Self {
            classifier,
            rewriter,
            publisher,
            dedup,
            destination: request.dest_channel.clone(),
            audience_name: request.audience_name.clone(),
        }
    }

    /// Run one message through the pipeline.
    ///
    /// The dedup marker only advances after a successful publish, so a
    /// rejected or failed message is looked at again on the next fetch.
    pub async fn process(
        &self,
        message: &Message,
        stop: &StopSignal,
    ) -> Result<RelayOutcome, PipelineError> {
        if !self.dedup.should_process(message).await {
            return Ok(RelayOutcome::Duplicate);
        }

        let classification = self.classifier.classify(message, &self.audience_name).await?;
        if !classification.is_fit() {
            return Ok(RelayOutcome::Rejected {
                rationale: classification.rationale,
            });
        }

        let Some(text) = self.rewriter.rewrite(message, &self.audience_name).await? else {
            return Ok(RelayOutcome::RewriteFailed);
        };

        if stop.is_set() {
            return Ok(RelayOutcome::Cancelled);
        }

        match self.publisher.publish(&self.destination, &text).await {
            Ok(()) => {
                self.dedup.mark_processed(message).await;
                Ok(RelayOutcome::Published)
            }
            Err(_) => Ok(RelayOutcome::PublishFailed),
        }
    }
}

/// Spawn the consumer loop for one relay run.
///
/// A pipeline error (a broken prompt template) halts the whole run by
/// raising `stop`, which also ends the poller.
pub fn spawn_consumer(
    relay: Relay,
    queue: Arc<RelayQueue>,
    stop: StopSignal,
    dequeue_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            destination = %relay.destination,
            audience = %relay.audience_name,
            "Relay consumer started"
        );

        while !stop.is_set() {
            let Some(message) = queue.dequeue(dequeue_timeout).await else {
                continue;
            };
            if stop.is_set() {
                break;
            }

            match relay.process(&message, &stop).await {
                Ok(RelayOutcome::Rejected { rationale }) => {
                    info!(posted_at = %message.posted_at, rationale = %rationale, "Message rejected");
                }
                Ok(outcome) => {
                    debug!(posted_at = %message.posted_at, outcome = outcome.label(), "Message processed");
                }
                Err(e) => {
                    error!(error = %e, "Relay halted by pipeline error");
                    stop.set();
                    break;
                }
            }
        }

        info!(destination = %relay.destination, "Relay consumer stopped");
    })
}

//! Relay controller — owns the active relay run and handles start/stop.
//!
//! At most one run is active. Starting while a run is active stops it
//! first: the new run's supervisor joins the old run's tasks before it
//! spawns its own poller and consumer, so two runs never overlap. Each
//! run gets a fresh queue and dedup marker.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::SharedChannelClient;
use crate::config::RelayConfig;
use crate::llm::LlmProvider;
use crate::pipeline::poller::spawn_poller;
use crate::pipeline::relay::spawn_consumer;
use crate::pipeline::{
    Classifier, Deduplicator, PromptTemplates, Publisher, Relay, RelayQueue, RelayRequest,
    Rewriter, StopSignal,
};

/// Whether a relay run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Idle,
    Running,
}

/// Snapshot reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub state: RelayState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(flatten)]
    pub request: Option<RelayRequest>,
}

impl RelayStatus {
    fn idle() -> Self {
        Self {
            state: RelayState::Idle,
            run_id: None,
            request: None,
        }
    }
}

struct ActiveRun {
    id: Uuid,
    request: RelayRequest,
    stop: StopSignal,
    supervisor: JoinHandle<()>,
}

#[derive(Default)]
struct ControlState {
    active: Option<ActiveRun>,
    /// Supervisor of a stopped run that may still be winding down.
    draining: Option<JoinHandle<()>>,
}

/// Starts, stops and reports on relay runs.
pub struct RelayController {
    client: SharedChannelClient,
    classifier: Arc<Classifier>,
    rewriter: Arc<Rewriter>,
    poll_interval: Duration,
    dequeue_timeout: Duration,
    state: Mutex<ControlState>,
}

impl RelayController {
    pub fn new(
        client: SharedChannelClient,
        llm: Arc<dyn LlmProvider>,
        templates: PromptTemplates,
        config: &RelayConfig,
    ) -> Self {
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&llm),
            templates.classify,
            config.accept_token.clone(),
            config.llm_timeout,
        ));
        let rewriter = Arc::new(Rewriter::new(llm, templates.rewrite, config.llm_timeout));

        Self {
            client,
            classifier,
            rewriter,
            poll_interval: config.poll_interval,
            dequeue_timeout: config.dequeue_timeout,
            state: Mutex::new(ControlState::default()),
        }
    }

    /// Start relaying with `request`, replacing any active run.
    ///
    /// Returns as soon as the run is scheduled; the previous run (if any)
    /// is joined in the background before the new one begins.
    pub async fn start(&self, request: RelayRequest) -> Uuid {
        let mut state = self.state.lock().await;

        let predecessor = match state.active.take() {
            Some(previous) => {
                info!(run_id = %previous.id, "Stopping current relay run before restart");
                previous.stop.set();
                Some(previous.supervisor)
            }
            None => state.draining.take(),
        };

        let run_id = Uuid::new_v4();
        let stop = StopSignal::new();
        let tasks = RunTasks {
            id: run_id,
            request: request.clone(),
            client: self.client.clone(),
            relay: Relay::new(
                Arc::clone(&self.classifier),
                Arc::clone(&self.rewriter),
                Publisher::new(self.client.clone()),
                Arc::new(Deduplicator::new()),
                &request,
            ),
            queue: Arc::new(RelayQueue::new()),
            stop: stop.clone(),
            poll_interval: self.poll_interval,
            dequeue_timeout: self.dequeue_timeout,
        };

        info!(
            run_id = %run_id,
            source = %request.source_channel,
            destination = %request.dest_channel,
            audience = %request.audience_name,
            "Relay start requested"
        );

        state.active = Some(ActiveRun {
            id: run_id,
            request,
            stop,
            supervisor: tokio::spawn(tasks.supervise(predecessor)),
        });
        run_id
    }

    /// Signal the active run to stop. Returns `false` when already idle.
    ///
    /// Does not wait for the run's tasks; they finish their current step
    /// and exit on their own.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(run) = state.active.take() else {
            debug!("Stop requested while idle");
            return false;
        };

        info!(run_id = %run.id, "Relay stop requested");
        run.stop.set();
        state.draining = Some(run.supervisor);
        true
    }

    pub async fn status(&self) -> RelayStatus {
        let state = self.state.lock().await;
        match &state.active {
            // A run halted by a pipeline error has its signal raised.
            Some(run) if !run.stop.is_set() => RelayStatus {
                state: RelayState::Running,
                run_id: Some(run.id),
                request: Some(run.request.clone()),
            },
            _ => RelayStatus::idle(),
        }
    }

    /// Stop the active run and wait for its tasks to exit.
    pub async fn shutdown(&self) {
        self.stop().await;
        let draining = self.state.lock().await.draining.take();
        if let Some(supervisor) = draining
            && let Err(e) = supervisor.await
        {
            warn!(error = %e, "Relay run ended abnormally during shutdown");
        }
        info!("Relay controller shut down");
    }
}

/// Everything one run's supervisor needs.
struct RunTasks {
    id: Uuid,
    request: RelayRequest,
    client: SharedChannelClient,
    relay: Relay,
    queue: Arc<RelayQueue>,
    stop: StopSignal,
    poll_interval: Duration,
    dequeue_timeout: Duration,
}

impl RunTasks {
    async fn supervise(self, predecessor: Option<JoinHandle<()>>) {
        let RunTasks {
            id,
            request,
            client,
            relay,
            queue,
            stop,
            poll_interval,
            dequeue_timeout,
        } = self;

        if let Some(previous) = predecessor
            && let Err(e) = previous.await
        {
            warn!(run_id = %id, error = %e, "Previous relay run ended abnormally");
        }

        if stop.is_set() {
            debug!(run_id = %id, "Relay run stopped before it started");
            return;
        }

        info!(run_id = %id, "Relay run started");

        let poller = spawn_poller(
            client,
            request.source_channel,
            Arc::clone(&queue),
            stop.clone(),
            poll_interval,
        );
        let consumer = spawn_consumer(relay, queue, stop.clone(), dequeue_timeout);

        // The consumer only exits once `stop` is raised (or it panicked);
        // raising it again makes sure the poller follows.
        if let Err(e) = consumer.await {
            error!(run_id = %id, error = %e, "Relay consumer panicked");
        }
        stop.set();
        if let Err(e) = poller.await {
            error!(run_id = %id, error = %e, "Source poller panicked");
        }

        info!(run_id = %id, "Relay run finished");
    }
}

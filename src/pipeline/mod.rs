//! Relay pipeline.
//!
//! Every relay run is two tasks sharing a queue:
//! 1. `poller`: fetches the latest source message on a fixed interval
//! 2. `relay`: dedup gate, `classify`, `rewrite`, then `publisher`
//!
//! The dedup marker advances only after a successful publish.

pub mod classify;
pub mod dedup;
pub mod poller;
pub mod prompts;
pub mod publisher;
pub mod queue;
pub mod relay;
pub mod rewrite;
pub mod signal;
pub mod types;

pub use classify::Classifier;
pub use dedup::Deduplicator;
pub use prompts::{PromptTemplate, PromptTemplates};
pub use publisher::Publisher;
pub use queue::RelayQueue;
pub use relay::Relay;
pub use rewrite::Rewriter;
pub use signal::StopSignal;
pub use types::{ClassificationResult, Decision, Message, RelayOutcome, RelayRequest};

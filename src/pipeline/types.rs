//! Shared types for the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Message ─────────────────────────────────────────────────────────

/// A message fetched from the source channel.
///
/// Immutable once fetched. `posted_at` is its only identity: the
/// deduplicator compares it against the last relayed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// When the message was posted in the source channel.
    pub posted_at: DateTime<Utc>,
    /// Message body.
    pub text: String,
}

impl Message {
    pub fn new(posted_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            posted_at,
            text: text.into(),
        }
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Whether a message suits the configured audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Fit,
    NotFit,
}

/// Classification stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub decision: Decision,
    pub rationale: String,
}

impl ClassificationResult {
    pub fn fit(rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::Fit,
            rationale: rationale.into(),
        }
    }

    pub fn not_fit(rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::NotFit,
            rationale: rationale.into(),
        }
    }

    /// Result used when the model call itself failed.
    pub fn unavailable() -> Self {
        Self::not_fit("")
    }

    pub fn is_fit(&self) -> bool {
        self.decision == Decision::Fit
    }
}

// ── Relay request / outcome ─────────────────────────────────────────

/// The (source, destination, audience) triple a relay run is started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(alias = "sourceChannel")]
    pub source_channel: String,
    #[serde(alias = "destChannel")]
    pub dest_channel: String,
    #[serde(alias = "audienceName")]
    pub audience_name: String,
}

/// What happened to one dequeued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Same `posted_at` as the last relayed message.
    Duplicate,
    /// Classified as not fitting the audience (or the model call failed).
    Rejected { rationale: String },
    /// Rewrite produced nothing to publish.
    RewriteFailed,
    /// Published to the destination; marker advanced.
    Published,
    /// Destination send failed; marker left untouched.
    PublishFailed,
    /// The run was stopped before the message could be published.
    Cancelled,
}

impl RelayOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Rejected { .. } => "rejected",
            Self::RewriteFailed => "rewrite_failed",
            Self::Published => "published",
            Self::PublishFailed => "publish_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

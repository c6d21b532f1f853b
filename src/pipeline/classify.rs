//! Classification stage — asks the model whether a message fits the audience.
//!
//! The model answers in two lines: a decision token, then a rationale.
//! Anything that does not parse cleanly is treated as NOT_FIT, and a failed
//! model call is logged and treated the same way.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::PromptTemplate;
use crate::pipeline::types::{ClassificationResult, Message};

/// Max tokens for the classification call (two short lines).
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Classifies messages against an audience.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    template: PromptTemplate,
    accept_token: String,
    timeout: Duration,
}

impl Classifier {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        template: PromptTemplate,
        accept_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            template,
            accept_token: accept_token.into(),
            timeout,
        }
    }

    /// Classify `message` for `audience_name`.
    ///
    /// Only a broken template is an error; model failures come back as
    /// [`ClassificationResult::unavailable`].
    pub async fn classify(
        &self,
        message: &Message,
        audience_name: &str,
    ) -> Result<ClassificationResult, PipelineError> {
        let prompt = self.template.build(audience_name, &message.text)?;
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(CLASSIFY_TEMPERATURE)
            .with_max_tokens(CLASSIFY_MAX_TOKENS);

        match llm::complete_text(self.llm.as_ref(), request, self.timeout).await {
            Ok(raw) => {
                let result = parse_classification_response(&raw, &self.accept_token);
                debug!(
                    posted_at = %message.posted_at,
                    decision = ?result.decision,
                    rationale = %result.rationale,
                    "Classification complete"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    posted_at = %message.posted_at,
                    error = %e,
                    "Classification call failed, treating message as NOT_FIT"
                );
                Ok(ClassificationResult::unavailable())
            }
        }
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse a raw two-line classification response.
///
/// Line 1 is the decision token, taken literally even when blank; the next
/// non-blank line is the rationale.
/// A response without a rationale, or whose first line is not the accept
/// token, is NOT_FIT.
pub fn parse_classification_response(raw: &str, accept_token: &str) -> ClassificationResult {
    let mut lines = raw.trim_end().lines();
    let decision_line = lines.next().unwrap_or_default();

    let Some(rationale) = lines.map(str::trim).find(|line| !line.is_empty()) else {
        return ClassificationResult::not_fit("malformed response: missing rationale line");
    };

    if token_matches(decision_line, accept_token) {
        ClassificationResult::fit(rationale)
    } else {
        ClassificationResult::not_fit(rationale)
    }
}

fn token_matches(line: &str, accept_token: &str) -> bool {
    let expected = normalize_token(accept_token);
    !expected.is_empty() && normalize_token(line).to_lowercase() == expected.to_lowercase()
}

/// Strip whitespace, quotes, markdown emphasis and trailing punctuation.
fn normalize_token(token: &str) -> &str {
    token.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '"' | '\'' | '`' | '«' | '»' | '.' | '!' | ':')
    })
}

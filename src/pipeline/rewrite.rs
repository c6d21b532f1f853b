//! Rewrite stage — adapts an accepted message for the audience.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::PromptTemplate;
use crate::pipeline::types::Message;

/// Max tokens for the rewritten post.
const REWRITE_MAX_TOKENS: u32 = 1024;

/// Temperature for rewriting (some freedom of phrasing).
const REWRITE_TEMPERATURE: f32 = 0.7;

/// Rewrites messages for an audience.
pub struct Rewriter {
    llm: Arc<dyn LlmProvider>,
    template: PromptTemplate,
    timeout: Duration,
}

impl Rewriter {
    pub fn new(llm: Arc<dyn LlmProvider>, template: PromptTemplate, timeout: Duration) -> Self {
        Self {
            llm,
            template,
            timeout,
        }
    }

    /// Rewrite `message` for `audience_name`.
    ///
    /// `Ok(None)` means "do not publish": the model call failed or returned
    /// only whitespace.
    pub async fn rewrite(
        &self,
        message: &Message,
        audience_name: &str,
    ) -> Result<Option<String>, PipelineError> {
        let prompt = self.template.build(audience_name, &message.text)?;
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(REWRITE_TEMPERATURE)
            .with_max_tokens(REWRITE_MAX_TOKENS);

        match llm::complete_text(self.llm.as_ref(), request, self.timeout).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(posted_at = %message.posted_at, "Rewrite returned empty text");
                Ok(None)
            }
            Ok(text) => {
                debug!(
                    posted_at = %message.posted_at,
                    chars = text.chars().count(),
                    "Rewrite complete"
                );
                Ok(Some(text))
            }
            Err(e) => {
                warn!(
                    posted_at = %message.posted_at,
                    error = %e,
                    "Rewrite call failed, message will not be published"
                );
                Ok(None)
            }
        }
    }
}

//! The abstract completion contract.
//!
//! The loop only ever talks to [`LlmProvider`]; the wire format of a
//! particular vendor lives behind it. Context overflow is a first-class
//! error variant because the agent loop routes it to the context manager
//! instead of propagating it.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{CompletionRequest, CompletionResponse};

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected the request because the prompt (plus requested
    /// output) exceeds the model's context window.
    #[error("context window exceeded: {message}")]
    ContextOverflow { message: String },

    #[error("provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("completion cancelled")]
    Cancelled,
}

/// Universal completion provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name recorded in the report (e.g. "openai-compat").
    fn name(&self) -> &str;

    /// Run one completion. Implementations must map a context-length
    /// rejection to [`LlmError::ContextOverflow`].
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// One-shot summarisation used by compaction and proactive checkpoints.
    /// The default funnels through `complete` with no tools attached.
    async fn summarize(&self, model: &str, prompt: String) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: vec![super::types::Message::user(prompt, 0)],
            tools: Vec::new(),
            max_output_tokens: 1024,
            sampling: Default::default(),
        };
        let response = self.complete(request).await?;
        Ok(response.content.unwrap_or_default().trim().to_string())
    }
}

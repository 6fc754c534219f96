//! LLM provider abstraction: conversation types, the completion contract,
//! and the bundled OpenAI-compatible HTTP adapter.

pub mod openai_compat;
pub mod provider;
pub mod types;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::{LlmError, LlmProvider};
pub use types::{
    CompactionState, CompletionRequest, CompletionResponse, FinishReason, Message, Role,
    SamplingParams, ToolCall,
};

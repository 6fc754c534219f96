//! Conversation and completion types shared by the loop and providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

/// Compaction lifecycle of a message. Level 1 moves tool results from `Raw`
/// to `Shrunk`; span summaries are created as `SummaryPlaceholder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompactionState {
    #[default]
    Raw,
    Shrunk,
    SummaryPlaceholder,
}

/// A single tool invocation requested by the model.
///
/// `arguments` is `None` when the model emitted JSON that failed to parse;
/// the call is still dispatched so it can be recorded as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Option<Value>,
}

/// One entry in the conversation transcript.
///
/// Messages are arena-indexed by position and never reordered; compaction
/// rewrites `content` in place. Tool results carry the originating tool name
/// plus a precomputed shrink summary used by Level 1 compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Turn the message belongs to; the system prompt sits at turn 0.
    pub turn: usize,
    #[serde(default)]
    pub compaction: CompactionState,
    /// Typed replacement text applied when Level 1 shrinks this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink_summary: Option<String>,
    /// True on tool results whose invocation failed.
    #[serde(default)]
    pub failed: bool,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            turn: 0,
            compaction: CompactionState::Raw,
            shrink_summary: None,
            failed: false,
        }
    }

    pub fn user(content: impl Into<String>, turn: usize) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            turn,
            compaction: CompactionState::Raw,
            shrink_summary: None,
            failed: false,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>, turn: usize) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            tool_name: None,
            turn,
            compaction: CompactionState::Raw,
            shrink_summary: None,
            failed: false,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        turn: usize,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            tool_name: Some(tool_name.into()),
            turn,
            compaction: CompactionState::Raw,
            shrink_summary: None,
            failed: false,
        }
    }

    /// Span summaries injected by compaction or snapshot restore.
    pub fn summary_placeholder(content: impl Into<String>, turn: usize) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            turn,
            compaction: CompactionState::SummaryPlaceholder,
            shrink_summary: None,
            failed: false,
        }
    }

    pub fn is_summary(&self) -> bool {
        self.compaction == CompactionState::SummaryPlaceholder
    }
}

/// Why the model stopped emitting tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
            Self::Length => "length",
        }
    }
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
}

/// One completion request: the fitted message list, the advertised tool
/// schemas, and the per-turn output budget computed by the context manager.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Value>,
    pub max_output_tokens: usize,
    pub sampling: SamplingParams,
}

/// The provider's answer: free text, tool calls, or both.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    /// A pure-text response terminates the run.
    pub fn is_final_answer(&self) -> bool {
        self.tool_calls.is_empty() && self.finish_reason != FinishReason::Length
    }
}

//! OpenAI-compatible chat-completions adapter.
//!
//! Speaks the `/chat/completions` dialect shared by OpenAI, OpenRouter,
//! vLLM, LM Studio and friends. Tool-call arguments arrive as a JSON string;
//! a string that fails to parse is surfaced as `arguments = None` so the
//! loop can record the call as a failure instead of dropping it.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::provider::{LlmError, LlmProvider};
use super::types::{
    CompletionRequest, CompletionResponse, FinishReason, Message, Role, ToolCall,
};

const REQUEST_TIMEOUT_SECS: u64 = 300;

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireToolCallOut {
    id: String,
    r#type: &'static str,
    function: WireFunctionOut,
}

#[derive(Serialize)]
struct WireFunctionOut {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallIn>,
}

#[derive(Deserialize)]
struct WireToolCallIn {
    id: String,
    function: WireFunctionIn,
}

#[derive(Deserialize)]
struct WireFunctionIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

fn encode_message(message: &Message) -> WireMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCallOut {
                    id: call.id.clone(),
                    r#type: "function",
                    function: WireFunctionOut {
                        name: call.name.clone(),
                        arguments: call
                            .arguments
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string()),
                    },
                })
                .collect(),
        )
    };
    WireMessage {
        role,
        content: message.content.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn decode_tool_call(wire: WireToolCallIn) -> ToolCall {
    let arguments = match serde_json::from_str::<Value>(&wire.function.arguments) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) | Err(_) => None,
    };
    ToolCall {
        id: wire.id,
        name: wire.function.name,
        arguments,
    }
}

fn looks_like_overflow(body: &WireErrorBody) -> bool {
    if body
        .code
        .as_deref()
        .is_some_and(|code| code.contains("context_length"))
    {
        return true;
    }
    let lowered = body.message.to_lowercase();
    lowered.contains("context length")
        || lowered.contains("context window")
        || lowered.contains("maximum context")
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let wire = WireRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(encode_message).collect(),
            tools: request.tools.clone(),
            max_tokens: request.max_output_tokens,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            seed: request.sampling.seed,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<WireError>(&text) {
                if status == StatusCode::BAD_REQUEST && looks_like_overflow(&parsed.error) {
                    return Err(LlmError::ContextOverflow {
                        message: parsed.error.message,
                    });
                }
                return Err(LlmError::Provider {
                    message: parsed.error.message,
                    status: Some(status.as_u16()),
                });
            }
            return Err(LlmError::Provider {
                message: text,
                status: Some(status.as_u16()),
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Provider {
                message: format!("malformed completion payload: {err}"),
                status: None,
            })?;

        let choice = parsed.choices.into_iter().next().ok_or(LlmError::Provider {
            message: "completion contained no choices".to_string(),
            status: None,
        })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(decode_tool_call)
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };

        debug!(
            finish_reason = finish_reason.as_str(),
            tool_calls = tool_calls.len(),
            "completion received"
        );

        Ok(CompletionResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_json_becomes_none() {
        let wire = WireToolCallIn {
            id: "call_1".into(),
            function: WireFunctionIn {
                name: "read_file".into(),
                arguments: "{not json".into(),
            },
        };
        let call = decode_tool_call(wire);
        assert_eq!(call.name, "read_file");
        assert!(call.arguments.is_none());
    }

    #[test]
    fn object_arguments_are_kept() {
        let wire = WireToolCallIn {
            id: "call_2".into(),
            function: WireFunctionIn {
                name: "grep".into(),
                arguments: r#"{"pattern":"fn main"}"#.into(),
            },
        };
        let call = decode_tool_call(wire);
        assert_eq!(call.arguments.unwrap()["pattern"], "fn main");
    }

    #[test]
    fn overflow_detected_from_code_and_message() {
        assert!(looks_like_overflow(&WireErrorBody {
            message: String::new(),
            code: Some("context_length_exceeded".into()),
        }));
        assert!(looks_like_overflow(&WireErrorBody {
            message: "This model's maximum context length is 8192 tokens".into(),
            code: None,
        }));
        assert!(!looks_like_overflow(&WireErrorBody {
            message: "rate limited".into(),
            code: None,
        }));
    }
}

//! Shared fixtures: a scripted provider and a runner builder over a
//! temporary workspace.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use swival_core::core::{AgentRunner, ContextConfig, ContextManager, RunnerConfig};
use swival_core::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, SamplingParams,
    ToolCall,
};
use swival_core::report::{ReportRecorder, Settings};
use swival_core::session::SessionContext;
use swival_core::tools::path_policy::PathPolicy;
use swival_core::tools::{CommandPolicy, SystemResolver, ToolRegistry, register_builtins};

/// One scripted provider step.
pub enum Step {
    /// Return this response.
    Respond(CompletionResponse),
    /// Fail with a provider-reported context overflow.
    Overflow,
}

pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Overflow) => Err(LlmError::ContextOverflow {
                message: "maximum context length exceeded".to_string(),
            }),
            None => Ok(text_response("script exhausted")),
        }
    }

    /// Compaction and checkpoint summaries must not consume the script.
    async fn summarize(&self, _model: &str, _prompt: String) -> Result<String, LlmError> {
        Ok("scripted summary of earlier work".to_string())
    }
}

pub fn text_response(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
        finish_reason: FinishReason::Stop,
    }
}

pub fn tool_response(calls: Vec<ToolCall>) -> CompletionResponse {
    CompletionResponse {
        content: None,
        tool_calls: calls,
        finish_reason: FinishReason::ToolCalls,
    }
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: Some(arguments),
    }
}

pub fn settings() -> Settings {
    Settings {
        temperature: None,
        top_p: None,
        seed: None,
        max_turns: 40,
        max_output_tokens: 1024,
        context_length: 32_768,
        yolo: false,
        allowed_commands: Vec::new(),
        skills_discovered: Vec::new(),
        instructions_loaded: Vec::new(),
    }
}

pub fn build_runner(base_dir: &Path, steps: Vec<Step>, max_turns: usize) -> AgentRunner {
    let paths = PathPolicy::new(base_dir, &[], &[], false).unwrap();
    let session = Arc::new(SessionContext::new(paths, false, false));

    let mut registry = ToolRegistry::new();
    let policy = Arc::new(CommandPolicy::from_allowlist(&[], base_dir, false).unwrap());
    register_builtins(&mut registry, policy, Arc::new(SystemResolver), false).unwrap();

    let context = ContextManager::new(ContextConfig {
        context_window: 32_768,
        max_output_tokens: 1024,
        safety_margin: 256,
        safety_floor: 64,
    });

    let report = ReportRecorder::new(
        "test task".to_string(),
        "test-model".to_string(),
        "scripted".to_string(),
        settings(),
    );

    let config = RunnerConfig {
        model: "test-model".to_string(),
        max_turns,
        sampling: SamplingParams::default(),
        proactive_summaries: false,
        system_preamble: "You are a test agent.".to_string(),
        instructions: Vec::new(),
    };

    AgentRunner::new(
        config,
        Arc::new(ScriptedProvider::new(steps)),
        Arc::new(registry),
        session,
        context,
        report,
    )
}

/// Convenience: `edit_file` arguments used by several scenarios.
pub fn edit_args(path: &str) -> serde_json::Value {
    json!({"path": path, "old_string": "TARGET", "new_string": "REPLACED"})
}

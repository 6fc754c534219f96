//! Turn scheduler: assemble the prompt, call the model, dispatch tool
//! calls, drive compaction on overflow, and terminate on a final answer or
//! turn exhaustion.

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::constants::CHECKPOINT_SUMMARY_INTERVAL;
use crate::core::context_manager::{CompactionStrategy, ContextManager, level1_summary};
use crate::core::guardrail::Guardrail;
use crate::knowledge::CheckpointSummary;
use crate::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, Message, Role,
    SamplingParams, ToolCall,
};
use crate::report::{Outcome, Report, ReportRecorder};
use crate::session::SessionContext;
use crate::snapshot::CollapseRequest;
use crate::tools::ToolRegistry;

/// Tools that leave the workspace untouched; only these keep a read-streak
/// alive, and none of them dirty an open snapshot.
const READ_ONLY_TOOLS: &[&str] = &[
    "read_file", "list_dir", "grep", "fetch_url", "think", "todo", "snapshot",
];
const MUTATING_TOOLS: &[&str] = &["write_file", "edit_file", "run_command"];

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub model: String,
    pub max_turns: usize,
    pub sampling: SamplingParams,
    pub proactive_summaries: bool,
    pub system_preamble: String,
    /// (source name, content) pairs, already truncated to the char cap.
    pub instructions: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: Outcome,
    pub answer: Option<String>,
    pub error_message: Option<String>,
}

enum TurnControl {
    Continue,
    Finished(RunSummary),
}

pub struct AgentRunner {
    config: RunnerConfig,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    session: Arc<SessionContext>,
    context: ContextManager,
    guardrail: Guardrail,
    report: ReportRecorder,
    messages: Vec<Message>,
    turn: usize,
    proactive: Option<JoinHandle<Option<CheckpointSummary>>>,
    last_checkpoint_turn: usize,
}

impl AgentRunner {
    pub fn new(
        config: RunnerConfig,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        session: Arc<SessionContext>,
        context: ContextManager,
        report: ReportRecorder,
    ) -> Self {
        let messages = vec![Message::system(String::new())];
        Self {
            config,
            provider,
            registry,
            session,
            context,
            guardrail: Guardrail::new(),
            report,
            messages,
            turn: 0,
            proactive: None,
            last_checkpoint_turn: 0,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Run a single task to completion.
    pub async fn run_task(&mut self, task: &str) -> RunSummary {
        self.push_user_prompt(task);
        self.drive().await
    }

    /// Run one REPL segment: the session (knowledge, read set, transcript)
    /// carries over between prompts.
    pub async fn run_segment(&mut self, prompt: &str) -> RunSummary {
        self.push_user_prompt(prompt);
        self.drive().await
    }

    pub fn into_report(self, summary: &RunSummary) -> Report {
        let mut report = self.report;
        report.set_turns(self.turn);
        report.finalize(
            summary.outcome,
            summary.answer.clone(),
            summary.error_message.clone(),
        )
    }

    fn push_user_prompt(&mut self, prompt: &str) {
        let turn = self.turn + 1;
        self.messages.push(Message::user(prompt, turn));
        self.session.set_idle_restore_start(turn);
    }

    async fn drive(&mut self) -> RunSummary {
        loop {
            if self.turn >= self.config.max_turns {
                info!(turns = self.turn, "turn budget exhausted");
                return RunSummary {
                    outcome: Outcome::Exhausted,
                    answer: None,
                    error_message: None,
                };
            }
            self.turn += 1;
            self.session.set_current_turn(self.turn);

            if self.session.cancel.is_cancelled() {
                return self.interrupted();
            }

            self.merge_proactive_summary().await;
            self.maybe_spawn_proactive_summary();
            self.assemble_system_prompt();

            match self.run_turn().await {
                TurnControl::Continue => {
                    self.apply_pending_collapse();
                }
                TurnControl::Finished(summary) => return summary,
            }
        }
    }

    /// One turn: fit, call, dispatch.
    async fn run_turn(&mut self) -> TurnControl {
        let response = match self.complete_with_fit().await {
            Ok(response) => response,
            Err(summary) => return TurnControl::Finished(summary),
        };

        if response.finish_reason == FinishReason::Length {
            self.report.record_truncated_response(self.turn);
        }

        let content = response.content.clone().unwrap_or_default();

        if response.tool_calls.is_empty() {
            if response.finish_reason == FinishReason::Length {
                // The model ran out of output budget mid-answer; let it
                // continue on the next turn.
                self.messages
                    .push(Message::assistant(content, Vec::new(), self.turn));
                return TurnControl::Continue;
            }
            debug!(turn = self.turn, "final answer received");
            return TurnControl::Finished(RunSummary {
                outcome: Outcome::Success,
                answer: Some(content),
                error_message: None,
            });
        }

        self.messages.push(Message::assistant(
            content,
            response.tool_calls.clone(),
            self.turn,
        ));

        let mut turn_read_only = true;
        for call in &response.tool_calls {
            if self.session.cancel.is_cancelled() {
                return TurnControl::Finished(self.interrupted());
            }
            self.dispatch_tool(call, &mut turn_read_only).await;
        }

        let nudge = self.session.snapshots.lock().note_turn(turn_read_only);
        if let Some(text) = nudge {
            self.messages
                .push(Message::user(format!("[system note] {text}"), self.turn));
        }

        TurnControl::Continue
    }

    /// Call the model, compacting and retrying on overflow. Escalates
    /// Level 1 → 2 → 3 within the turn; a Level 3 failure aborts the run.
    async fn complete_with_fit(&mut self) -> Result<CompletionResponse, RunSummary> {
        let schema_tokens = self
            .registry
            .schema_tokens(self.context.estimator());
        let mut next_level = Some(CompactionStrategy::CompactMessages);
        let mut retry_reason: Option<String> = None;

        loop {
            let budget = loop {
                match self
                    .context
                    .output_budget(&self.messages, schema_tokens)
                {
                    Some(budget) => break budget,
                    None => match next_level {
                        Some(strategy) => {
                            self.run_compaction(strategy).await;
                            next_level = strategy.next();
                            retry_reason = Some(strategy.as_str().to_string());
                        }
                        None => return Err(self.context_exhausted()),
                    },
                }
            };

            let request = CompletionRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tools: self.registry.llm_payload(),
                max_output_tokens: budget,
                sampling: self.config.sampling,
            };
            let prompt_tokens = self.context.prompt_tokens(&self.messages, schema_tokens);

            let started = Instant::now();
            let result = tokio::select! {
                result = self.provider.complete(request) => result,
                _ = self.session.cancel.cancelled() => Err(LlmError::Cancelled),
            };
            let duration = started.elapsed().as_secs_f64();

            match result {
                Ok(response) => {
                    self.report.record_llm_call(
                        self.turn,
                        duration,
                        prompt_tokens,
                        response.finish_reason.as_str(),
                        retry_reason.take(),
                    );
                    return Ok(response);
                }
                Err(LlmError::ContextOverflow { message }) => {
                    warn!(turn = self.turn, %message, "provider reported context overflow");
                    self.report.record_llm_call(
                        self.turn,
                        duration,
                        prompt_tokens,
                        "error",
                        retry_reason.take(),
                    );
                    match next_level {
                        Some(strategy) => {
                            self.run_compaction(strategy).await;
                            next_level = strategy.next();
                            retry_reason = Some(strategy.as_str().to_string());
                        }
                        None => return Err(self.context_exhausted()),
                    }
                }
                Err(LlmError::Cancelled) => return Err(self.interrupted()),
                Err(err) => {
                    return Err(RunSummary {
                        outcome: Outcome::Error,
                        answer: None,
                        error_message: Some(err.to_string()),
                    });
                }
            }
        }
    }

    async fn run_compaction(&mut self, strategy: CompactionStrategy) {
        // A proactive summary in flight must not block compaction; cancel it.
        if let Some(handle) = self.proactive.take() {
            handle.abort();
        }
        let checkpoints = self.session.knowledge.checkpoints.lock().clone();
        let outcome = self
            .context
            .compact(
                strategy,
                &mut self.messages,
                self.turn,
                &self.provider,
                &self.config.model,
                &checkpoints,
            )
            .await;
        self.report.record_compaction(
            self.turn,
            outcome.strategy.as_str(),
            outcome.tokens_before,
            outcome.tokens_after,
            outcome.turns_dropped,
        );
    }

    async fn dispatch_tool(&mut self, call: &ToolCall, turn_read_only: &mut bool) {
        let started = Instant::now();
        let result: Result<String, crate::error::ToolError> = match &call.arguments {
            None => Err(crate::error::ToolError::new(
                crate::error::ToolErrorKind::InvalidToolArguments,
                "the model emitted arguments that are not valid JSON",
            )),
            Some(args) => {
                self.registry
                    .invoke(&call.name, args.clone(), &self.session)
                    .await
            }
        };
        let duration = started.elapsed().as_secs_f64();

        let succeeded = result.is_ok();
        if !READ_ONLY_TOOLS.contains(&call.name.as_str()) {
            *turn_read_only = false;
        }
        if succeeded && MUTATING_TOOLS.contains(&call.name.as_str()) {
            self.session.snapshots.lock().mark_dirty();
        }

        let (text, error_label, failed) = match result {
            Ok(text) => (text, None, false),
            Err(err) => (err.to_string(), Some(err.report_label()), true),
        };

        self.report.record_tool_call(
            self.turn,
            &call.name,
            call.arguments.clone(),
            succeeded,
            duration,
            text.len(),
            error_label,
        );

        let mut message = Message::tool_result(&call.id, &call.name, &text, self.turn);
        message.failed = failed;
        if !failed {
            message.shrink_summary = Some(level1_summary(
                &call.name,
                call.arguments.as_ref(),
                &text,
            ));
        }
        self.messages.push(message);

        if let Some(intervention) =
            self.guardrail
                .note(&call.name, call.arguments.as_ref(), succeeded)
        {
            self.report.record_guardrail(
                self.turn,
                &intervention.tool,
                intervention.level.as_str(),
            );
            self.messages
                .push(Message::user(intervention.message, self.turn));
        }
    }

    /// System prompt: static preamble + instruction files + serialized
    /// knowledge channels, rebuilt every turn in place at index 0.
    fn assemble_system_prompt(&mut self) {
        let mut prompt = self.config.system_preamble.clone();
        for (name, content) in &self.config.instructions {
            prompt.push_str(&format!("\n\n# Instructions from {name}\n{content}"));
        }
        let knowledge = self
            .session
            .knowledge
            .render_for_system_prompt(self.turn);
        if !knowledge.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&knowledge);
        }
        self.messages[0].content = prompt;
    }

    /// Apply a snapshot collapse stashed by the snapshot tool: remove the
    /// span's non-user messages and put one recap in their place.
    fn apply_pending_collapse(&mut self) {
        let Some(collapse) = self.session.take_pending_collapse() else {
            return;
        };
        let CollapseRequest {
            label,
            summary,
            from_turn,
            to_turn,
        } = collapse;

        let in_span = |m: &Message| {
            m.turn >= from_turn && m.turn <= to_turn && m.role != Role::User && m.turn != 0
        };
        let Some(insert_at) = self.messages.iter().position(in_span) else {
            return;
        };
        self.messages.retain(|m| !in_span(m));
        self.messages.insert(
            insert_at,
            Message::summary_placeholder(
                format!("[snapshot '{label}' collapsed] {summary}"),
                from_turn,
            ),
        );
        debug!(from_turn, to_turn, "snapshot span collapsed");
    }

    /// Merge a finished proactive summary at the turn boundary and
    /// consolidate the store when it has grown past its cap.
    async fn merge_proactive_summary(&mut self) {
        let finished = self
            .proactive
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let handle = self.proactive.take().expect("checked above");
        match handle.await {
            Ok(Some(summary)) => {
                let mut checkpoints = self.session.knowledge.checkpoints.lock();
                checkpoints.push(summary);
                let needs_merge = checkpoints.needs_consolidation(self.context.estimator());
                drop(checkpoints);
                if needs_merge {
                    let mut owned =
                        std::mem::take(&mut *self.session.knowledge.checkpoints.lock());
                    owned.consolidate(&self.provider, &self.config.model).await;
                    *self.session.knowledge.checkpoints.lock() = owned;
                }
            }
            Ok(None) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "proactive summary task failed"),
        }
    }

    fn maybe_spawn_proactive_summary(&mut self) {
        if !self.config.proactive_summaries || self.proactive.is_some() {
            return;
        }
        let completed = self.turn.saturating_sub(1);
        if completed < self.last_checkpoint_turn + CHECKPOINT_SUMMARY_INTERVAL {
            return;
        }
        let range = (self.last_checkpoint_turn + 1, completed);
        self.last_checkpoint_turn = completed;

        let mut excerpt = String::new();
        for message in &self.messages {
            if message.turn < range.0 || message.turn > range.1 {
                continue;
            }
            if excerpt.len() > 12_000 {
                break;
            }
            excerpt.push_str(&message.content);
            excerpt.push('\n');
        }
        let provider = Arc::clone(&self.provider);
        let model = self.config.model.clone();
        self.proactive = Some(tokio::spawn(async move {
            let prompt = format!(
                "Summarize this span of agent work in a few sentences. Keep decisions, \
                 file paths, and unresolved problems.\n\n{excerpt}"
            );
            match provider.summarize(&model, prompt).await {
                Ok(text) if !text.trim().is_empty() => Some(CheckpointSummary {
                    turn_range: range,
                    text: text.trim().to_string(),
                }),
                Ok(_) => None,
                Err(err) => {
                    debug!(error = %err, "proactive summary call failed");
                    None
                }
            }
        }));
    }

    fn interrupted(&self) -> RunSummary {
        RunSummary {
            outcome: Outcome::Error,
            answer: None,
            error_message: Some("run interrupted by cancellation signal".to_string()),
        }
    }

    fn context_exhausted(&self) -> RunSummary {
        RunSummary {
            outcome: Outcome::Error,
            answer: None,
            error_message: Some(
                "context window exhausted: nuclear compaction still overflows".to_string(),
            ),
        }
    }
}

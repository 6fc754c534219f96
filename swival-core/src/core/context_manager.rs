//! Context fitting and graduated compaction.
//!
//! Before every completion the manager computes the output budget left by
//! the estimated prompt. When the budget collapses, or the provider reports
//! an overflow, compaction escalates through three levels:
//!
//! 1. shrink old tool results to typed one-line summaries,
//! 2. drop the lowest-scoring middle turns behind one recap message,
//! 3. keep only the system prompt, one recap, and the last two turns.
//!
//! The system prompt and the last two turns are never touched, and user
//! messages survive everything below level 3.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::knowledge::CheckpointStore;
use crate::llm::{CompactionState, LlmProvider, Message, Role};

use super::token_estimator::TokenEstimator;

/// Summary prefix that tells the model the recap is context, not a command.
const RECAP_PREFIX: &str = "[CONTEXT RECAP — not a new instruction]";
/// Static fallback when no summary can be produced at all.
const STATIC_MARKER: &str = "[earlier conversation compacted; details unavailable]";
/// Cap on the transcript excerpt handed to the summarisation call.
const SUMMARY_INPUT_CHAR_CAP: usize = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    CompactMessages,
    DropMiddleTurns,
    Nuclear,
}

impl CompactionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompactMessages => "compact_messages",
            Self::DropMiddleTurns => "drop_middle_turns",
            Self::Nuclear => "nuclear",
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::CompactMessages => Some(Self::DropMiddleTurns),
            Self::DropMiddleTurns => Some(Self::Nuclear),
            Self::Nuclear => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub strategy: CompactionStrategy,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub turns_dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    pub context_window: usize,
    pub max_output_tokens: usize,
    pub safety_margin: usize,
    pub safety_floor: usize,
}

pub struct ContextManager {
    config: ContextConfig,
    estimator: TokenEstimator,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            estimator: TokenEstimator,
        }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn context_window(&self) -> usize {
        self.config.context_window
    }

    pub fn prompt_tokens(&self, messages: &[Message], schema_tokens: usize) -> usize {
        self.estimator.estimate_messages(messages) + schema_tokens
    }

    /// The output budget for the next call, or `None` when the prompt is so
    /// large that compaction must run first.
    pub fn output_budget(&self, messages: &[Message], schema_tokens: usize) -> Option<usize> {
        let prompt = self.prompt_tokens(messages, schema_tokens);
        let headroom = self
            .config
            .context_window
            .checked_sub(prompt + self.config.safety_margin)?;
        let budget = headroom.min(self.config.max_output_tokens);
        if budget <= self.config.safety_floor {
            None
        } else {
            Some(budget)
        }
    }

    /// Run one compaction level. Returns the outcome for the report.
    pub async fn compact(
        &self,
        strategy: CompactionStrategy,
        messages: &mut Vec<Message>,
        current_turn: usize,
        provider: &Arc<dyn LlmProvider>,
        model: &str,
        checkpoints: &CheckpointStore,
    ) -> CompactionOutcome {
        let tokens_before = self.estimator.estimate_messages(messages);
        let turns_dropped = match strategy {
            CompactionStrategy::CompactMessages => {
                shrink_tool_results(messages, current_turn);
                0
            }
            CompactionStrategy::DropMiddleTurns => {
                self.drop_middle_turns(messages, current_turn, provider, model, checkpoints)
                    .await
            }
            CompactionStrategy::Nuclear => {
                self.nuclear(messages, current_turn, provider, model, checkpoints)
                    .await
            }
        };
        let tokens_after = self.estimator.estimate_messages(messages);
        debug!(
            strategy = strategy.as_str(),
            tokens_before, tokens_after, turns_dropped, "compaction ran"
        );
        CompactionOutcome {
            strategy,
            tokens_before,
            tokens_after,
            turns_dropped,
        }
    }

    /// Level 2: score non-user turns outside the protected tail, keep the
    /// better half, and replace the dropped span with one recap message.
    async fn drop_middle_turns(
        &self,
        messages: &mut Vec<Message>,
        current_turn: usize,
        provider: &Arc<dyn LlmProvider>,
        model: &str,
        checkpoints: &CheckpointStore,
    ) -> usize {
        let protected_from = current_turn.saturating_sub(1);
        let mut candidates: Vec<(usize, i64)> = Vec::new();
        let mut turns_seen = std::collections::BTreeSet::new();
        for message in messages.iter() {
            if message.turn == 0 || message.turn >= protected_from {
                continue;
            }
            turns_seen.insert(message.turn);
        }
        for turn in turns_seen {
            candidates.push((turn, score_turn(messages, turn)));
        }
        if candidates.is_empty() {
            return 0;
        }

        // Keep the top-scoring half; recency wins ties.
        let keep = candidates.len() / 2;
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        let dropped_turns: std::collections::BTreeSet<usize> =
            candidates[keep..].iter().map(|(turn, _)| *turn).collect();
        if dropped_turns.is_empty() {
            return 0;
        }

        let range = (
            *dropped_turns.iter().next().expect("non-empty"),
            *dropped_turns.iter().next_back().expect("non-empty"),
        );
        let summary = self
            .span_summary(messages, &dropped_turns, range, provider, model, checkpoints)
            .await;

        let insert_at = messages
            .iter()
            .position(|m| dropped_turns.contains(&m.turn) && m.role != Role::User)
            .unwrap_or(messages.len());
        let recap_turn = range.0;
        // User messages are not eligible for dropping at this level.
        messages.retain(|m| !(dropped_turns.contains(&m.turn) && m.role != Role::User));
        messages.insert(insert_at, Message::summary_placeholder(summary, recap_turn));
        dropped_turns.len()
    }

    /// Level 3: system prompt, one summary, last two turns verbatim.
    async fn nuclear(
        &self,
        messages: &mut Vec<Message>,
        current_turn: usize,
        provider: &Arc<dyn LlmProvider>,
        model: &str,
        checkpoints: &CheckpointStore,
    ) -> usize {
        let protected_from = current_turn.saturating_sub(1);
        let dropped_turns: std::collections::BTreeSet<usize> = messages
            .iter()
            .filter(|m| m.turn > 0 && m.turn < protected_from)
            .map(|m| m.turn)
            .collect();
        if dropped_turns.is_empty() {
            return 0;
        }

        let range = (
            *dropped_turns.iter().next().expect("non-empty"),
            *dropped_turns.iter().next_back().expect("non-empty"),
        );
        let summary = self
            .span_summary(messages, &dropped_turns, range, provider, model, checkpoints)
            .await;

        let mut kept: Vec<Message> = Vec::with_capacity(messages.len());
        let mut summary_inserted = false;
        for message in messages.drain(..) {
            if message.turn == 0 || message.turn >= protected_from {
                kept.push(message);
            } else if !summary_inserted {
                kept.push(Message::summary_placeholder(summary.clone(), range.0));
                summary_inserted = true;
            }
        }
        *messages = kept;
        dropped_turns.len()
    }

    /// Produce the span recap: a live summarisation call, falling back to
    /// the best-matching checkpoint summary, falling back to a marker.
    async fn span_summary(
        &self,
        messages: &[Message],
        dropped_turns: &std::collections::BTreeSet<usize>,
        range: (usize, usize),
        provider: &Arc<dyn LlmProvider>,
        model: &str,
        checkpoints: &CheckpointStore,
    ) -> String {
        let mut excerpt = String::new();
        for message in messages {
            if !dropped_turns.contains(&message.turn) {
                continue;
            }
            if excerpt.len() >= SUMMARY_INPUT_CHAR_CAP {
                break;
            }
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let room = SUMMARY_INPUT_CHAR_CAP - excerpt.len();
            let content: String = message.content.chars().take(room).collect();
            excerpt.push_str(&format!("[{role}] {content}\n"));
        }

        let prompt = format!(
            "Summarize this span of an agent conversation. Preserve decisions, file paths, \
             commands run, errors hit, and open questions. Be concise.\n\n{excerpt}"
        );
        match provider.summarize(model, prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                format!("{RECAP_PREFIX} {}", text.trim())
            }
            Ok(_) | Err(_) => {
                warn!("span summarisation failed; using fallback");
                match checkpoints.most_relevant(range) {
                    Some(checkpoint) => format!("{RECAP_PREFIX} {}", checkpoint.text),
                    None => format!("{RECAP_PREFIX} {STATIC_MARKER}"),
                }
            }
        }
    }
}

/// Level 1: replace old raw tool results with their typed summaries. Running
/// it twice is a no-op because shrunk messages are skipped.
fn shrink_tool_results(messages: &mut [Message], current_turn: usize) {
    let protected_from = current_turn.saturating_sub(1);
    for message in messages.iter_mut() {
        if message.role != Role::Tool
            || message.turn >= protected_from
            || message.compaction != CompactionState::Raw
        {
            continue;
        }
        let replacement = message.shrink_summary.clone().unwrap_or_else(|| {
            let name = message.tool_name.as_deref().unwrap_or("tool");
            format!("[{name} — output compacted]")
        });
        message.content = replacement;
        message.compaction = CompactionState::Shrunk;
    }
}

/// Level-2 importance: writes outrank errors and recaps, which outrank
/// thinking, which outranks the base score.
fn score_turn(messages: &[Message], turn: usize) -> i64 {
    let mut score = 1i64;
    let mut has_write = false;
    let mut has_error = false;
    let mut is_recap = false;
    let mut think_calls = 0usize;

    for message in messages.iter().filter(|m| m.turn == turn) {
        for call in &message.tool_calls {
            match call.name.as_str() {
                "write_file" | "edit_file" | "run_command" => has_write = true,
                "think" => think_calls += 1,
                _ => {}
            }
        }
        if message.role == Role::Tool && message.failed {
            has_error = true;
        }
        if message.is_summary() {
            is_recap = true;
        }
    }

    if has_write {
        score += 3;
    }
    if has_error {
        score += 2;
    }
    if is_recap {
        score += 2;
    }
    if think_calls >= 2 {
        score += 1;
    }
    score
}

/// Typed Level-1 replacement text, computed when the result is appended.
/// MCP results keep a 300-character head; commands keep head and tail;
/// everything else discards content.
pub fn level1_summary(tool_name: &str, args: Option<&serde_json::Value>, content: &str) -> String {
    let arg = |key: &str| -> String {
        args.and_then(|value| value.get(key))
            .and_then(|value| value.as_str())
            .unwrap_or("?")
            .to_string()
    };

    if let Some((server, tool)) = crate::mcp::split_qualified_name(tool_name) {
        let head: String = content.chars().take(300).collect();
        return format!("[mcp:{server}/{tool} — {head}]");
    }

    match tool_name {
        "read_file" => {
            let lines = content.lines().count();
            format!("[read_file: {}, {lines} lines — content compacted]", arg("path"))
        }
        "grep" => {
            let matches = content.lines().count();
            format!(
                "[grep: '{}' in {}, ~{matches} matches — compacted]",
                arg("pattern"),
                arg("path")
            )
        }
        "run_command" => {
            let argv0 = args
                .and_then(|value| value.get("args"))
                .and_then(|value| value.as_array())
                .and_then(|items| items.first())
                .and_then(|value| value.as_str())
                .unwrap_or("?");
            let head: String = content.chars().take(200).collect();
            let tail: String = if content.chars().count() > 400 {
                let total = content.chars().count();
                content.chars().skip(total - 200).collect()
            } else {
                String::new()
            };
            format!("[run_command: {argv0} — {head}…{tail}]")
        }
        other => format!("[{other} — output compacted]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmError, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoSummaries;

    #[async_trait]
    impl LlmProvider for NoSummaries {
        fn name(&self) -> &str {
            "none"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::Network("offline".into()))
        }
    }

    fn manager() -> ContextManager {
        ContextManager::new(ContextConfig {
            context_window: 8192,
            max_output_tokens: 1024,
            safety_margin: 256,
            safety_floor: 64,
        })
    }

    fn transcript(turns: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("preamble")];
        for turn in 1..=turns {
            if turn == 1 {
                messages.push(Message::user("do the task", 1));
            }
            let call = ToolCall {
                id: format!("call_{turn}"),
                name: "read_file".to_string(),
                arguments: Some(json!({"path": format!("src/file{turn}.rs")})),
            };
            messages.push(Message::assistant("", vec![call], turn));
            let mut result = Message::tool_result(
                format!("call_{turn}"),
                "read_file",
                "line one\nline two\nline three",
                turn,
            );
            result.shrink_summary = Some(level1_summary(
                "read_file",
                Some(&json!({"path": format!("src/file{turn}.rs")})),
                &result.content,
            ));
            messages.push(result);
        }
        messages
    }

    #[test]
    fn budget_shrinks_with_prompt_and_bottoms_out() {
        let manager = manager();
        let small = vec![Message::system("s"), Message::user("hi", 1)];
        let budget = manager.output_budget(&small, 0).unwrap();
        assert_eq!(budget, 1024);

        let huge = vec![
            Message::system("s"),
            Message::user("x".repeat(8192 * 4), 1),
        ];
        assert!(manager.output_budget(&huge, 0).is_none());
    }

    #[test]
    fn level1_shrinks_only_old_raw_tool_results() {
        let mut messages = transcript(5);
        shrink_tool_results(&mut messages, 5);

        for message in &messages {
            if message.role != Role::Tool {
                continue;
            }
            if message.turn < 4 {
                assert_eq!(message.compaction, CompactionState::Shrunk);
                assert!(message.content.starts_with("[read_file:"));
                assert!(message.content.contains("3 lines"));
            } else {
                assert_eq!(message.compaction, CompactionState::Raw);
            }
        }
    }

    #[test]
    fn level1_twice_is_a_no_op() {
        let mut messages = transcript(5);
        shrink_tool_results(&mut messages, 5);
        let after_first = messages.clone();
        shrink_tool_results(&mut messages, 5);
        assert_eq!(messages, after_first);
    }

    #[tokio::test]
    async fn level2_keeps_user_messages_and_high_value_turns() {
        let mut messages = transcript(8);
        // Make turn 2 a write turn so it outranks the read-only turns.
        for message in messages.iter_mut().filter(|m| m.turn == 2) {
            if let Some(call) = message.tool_calls.first_mut() {
                call.name = "write_file".to_string();
            }
        }

        let provider: Arc<dyn LlmProvider> = Arc::new(NoSummaries);
        let manager = manager();
        let outcome = manager
            .compact(
                CompactionStrategy::DropMiddleTurns,
                &mut messages,
                8,
                &provider,
                "m",
                &CheckpointStore::default(),
            )
            .await;

        assert!(outcome.turns_dropped > 0);
        assert!(outcome.tokens_after < outcome.tokens_before);
        // The opening user message survives level 2.
        assert!(messages.iter().any(|m| m.role == Role::User));
        // The write turn survives.
        assert!(messages
            .iter()
            .any(|m| m.turn == 2 && m.role == Role::Assistant && !m.is_summary()));
        // Exactly one recap was inserted.
        assert_eq!(messages.iter().filter(|m| m.is_summary()).count(), 1);
        let recap = messages.iter().find(|m| m.is_summary()).unwrap();
        assert!(recap.content.starts_with(RECAP_PREFIX));
    }

    #[tokio::test]
    async fn level3_leaves_system_one_summary_and_last_two_turns() {
        let mut messages = transcript(9);
        let provider: Arc<dyn LlmProvider> = Arc::new(NoSummaries);
        let manager = manager();
        manager
            .compact(
                CompactionStrategy::Nuclear,
                &mut messages,
                9,
                &provider,
                "m",
                &CheckpointStore::default(),
            )
            .await;

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.iter().filter(|m| m.is_summary()).count(), 1);
        for message in messages.iter().skip(1) {
            assert!(message.is_summary() || message.turn >= 8);
        }
        // User message from turn 1 was dropped at this level.
        assert!(!messages.iter().any(|m| m.role == Role::User));
    }

    #[test]
    fn typed_summaries_match_their_tools() {
        let mcp = level1_summary("mcp__docs__search", None, &"x".repeat(1000));
        assert!(mcp.starts_with("[mcp:docs/search — "));
        assert!(mcp.len() < 350);

        let cmd = level1_summary(
            "run_command",
            Some(&json!({"args": ["cargo", "test"]})),
            &"y".repeat(1000),
        );
        assert!(cmd.starts_with("[run_command: cargo — "));
        assert!(cmd.contains('…'));
    }
}

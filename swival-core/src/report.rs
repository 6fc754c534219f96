//! Run report: typed timeline events, aggregate counters, and the final
//! JSON document written atomically at the end of the run.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Exhausted,
    Error,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Exhausted => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
    pub max_turns: usize,
    pub max_output_tokens: usize,
    pub context_length: usize,
    pub yolo: bool,
    pub allowed_commands: Vec<String>,
    pub skills_discovered: Vec<String>,
    pub instructions_loaded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub outcome: Outcome,
    pub answer: Option<String>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ToolCounts {
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub turns: usize,
    pub llm_calls: u64,
    pub total_llm_time_s: f64,
    pub total_tool_time_s: f64,
    pub tool_calls_total: u64,
    pub tool_calls_succeeded: u64,
    pub tool_calls_failed: u64,
    pub tool_calls_by_name: BTreeMap<String, ToolCounts>,
    pub compactions: u64,
    pub turn_drops: u64,
    pub guardrail_interventions: u64,
    pub truncated_responses: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    LlmCall {
        duration_s: f64,
        prompt_tokens_est: usize,
        finish_reason: String,
        is_retry: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_reason: Option<String>,
    },
    ToolCall {
        name: String,
        arguments: Option<Value>,
        succeeded: bool,
        duration_s: f64,
        result_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Compaction {
        strategy: String,
        tokens_before: usize,
        tokens_after: usize,
    },
    Guardrail {
        tool: String,
        level: String,
    },
    TruncatedResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub turn: usize,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub version: u32,
    pub timestamp: String,
    pub task: String,
    pub model: String,
    pub provider: String,
    pub settings: Settings,
    pub result: RunResult,
    pub stats: Stats,
    pub timeline: Vec<TimelineEntry>,
}

/// Append-only recorder. Counters are updated incrementally so the final
/// document is a straight serialisation, not a scan.
pub struct ReportRecorder {
    task: String,
    model: String,
    provider: String,
    settings: Settings,
    stats: Stats,
    timeline: Vec<TimelineEntry>,
    started_at: DateTime<Utc>,
}

impl ReportRecorder {
    pub fn new(task: String, model: String, provider: String, settings: Settings) -> Self {
        Self {
            task,
            model,
            provider,
            settings,
            stats: Stats::default(),
            timeline: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn set_turns(&mut self, turns: usize) {
        self.stats.turns = turns;
    }

    pub fn record_llm_call(
        &mut self,
        turn: usize,
        duration_s: f64,
        prompt_tokens_est: usize,
        finish_reason: &str,
        retry_reason: Option<String>,
    ) {
        self.stats.llm_calls += 1;
        self.stats.total_llm_time_s += duration_s;
        self.timeline.push(TimelineEntry {
            turn,
            event: TimelineEvent::LlmCall {
                duration_s,
                prompt_tokens_est,
                finish_reason: finish_reason.to_string(),
                is_retry: retry_reason.is_some(),
                retry_reason,
            },
        });
    }

    pub fn record_tool_call(
        &mut self,
        turn: usize,
        name: &str,
        arguments: Option<Value>,
        succeeded: bool,
        duration_s: f64,
        result_length: usize,
        error: Option<String>,
    ) {
        self.stats.tool_calls_total += 1;
        self.stats.total_tool_time_s += duration_s;
        let entry = self
            .stats
            .tool_calls_by_name
            .entry(name.to_string())
            .or_default();
        if succeeded {
            self.stats.tool_calls_succeeded += 1;
            entry.succeeded += 1;
        } else {
            self.stats.tool_calls_failed += 1;
            entry.failed += 1;
        }
        self.timeline.push(TimelineEntry {
            turn,
            event: TimelineEvent::ToolCall {
                name: name.to_string(),
                arguments,
                succeeded,
                duration_s,
                result_length,
                error,
            },
        });
    }

    pub fn record_compaction(
        &mut self,
        turn: usize,
        strategy: &str,
        tokens_before: usize,
        tokens_after: usize,
        turns_dropped: usize,
    ) {
        self.stats.compactions += 1;
        self.stats.turn_drops += turns_dropped as u64;
        self.timeline.push(TimelineEntry {
            turn,
            event: TimelineEvent::Compaction {
                strategy: strategy.to_string(),
                tokens_before,
                tokens_after,
            },
        });
    }

    pub fn record_guardrail(&mut self, turn: usize, tool: &str, level: &str) {
        self.stats.guardrail_interventions += 1;
        self.timeline.push(TimelineEntry {
            turn,
            event: TimelineEvent::Guardrail {
                tool: tool.to_string(),
                level: level.to_string(),
            },
        });
    }

    pub fn record_truncated_response(&mut self, turn: usize) {
        self.stats.truncated_responses += 1;
        self.timeline.push(TimelineEntry {
            turn,
            event: TimelineEvent::TruncatedResponse,
        });
    }

    pub fn finalize(self, outcome: Outcome, answer: Option<String>, error_message: Option<String>) -> Report {
        Report {
            version: REPORT_VERSION,
            timestamp: self
                .started_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            task: self.task,
            model: self.model,
            provider: self.provider,
            settings: self.settings,
            result: RunResult {
                outcome,
                answer,
                exit_code: outcome.exit_code(),
                error_message,
            },
            stats: self.stats,
            timeline: self.timeline,
        }
    }
}

impl Report {
    /// Atomic write: serialise next to the target, then rename over it.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            temperature: Some(0.2),
            top_p: None,
            seed: Some(7),
            max_turns: 10,
            max_output_tokens: 512,
            context_length: 8192,
            yolo: false,
            allowed_commands: vec!["cargo".into(), "git".into()],
            skills_discovered: Vec::new(),
            instructions_loaded: vec!["AGENTS.md".into()],
        }
    }

    #[test]
    fn counters_stay_consistent() {
        let mut recorder = ReportRecorder::new("t".into(), "m".into(), "p".into(), settings());
        recorder.record_tool_call(1, "read_file", Some(json!({"path": "a"})), true, 0.1, 12, None);
        recorder.record_tool_call(1, "edit_file", None, false, 0.0, 0, Some("InvalidToolArguments".into()));
        recorder.record_tool_call(2, "edit_file", Some(json!({"path": "a"})), true, 0.2, 5, None);

        let stats = recorder.stats();
        assert_eq!(stats.tool_calls_total, 3);
        assert_eq!(
            stats.tool_calls_succeeded + stats.tool_calls_failed,
            stats.tool_calls_total
        );
        let by_name: u64 = stats
            .tool_calls_by_name
            .values()
            .map(|c| c.succeeded + c.failed)
            .sum();
        assert_eq!(by_name, stats.tool_calls_total);
    }

    #[test]
    fn report_json_round_trips() {
        let mut recorder = ReportRecorder::new("task".into(), "m".into(), "p".into(), settings());
        recorder.record_llm_call(1, 1.5, 420, "tool_calls", None);
        recorder.record_compaction(2, "compact_messages", 9000, 4000, 0);
        recorder.record_llm_call(2, 0.7, 4100, "stop", Some("compact_messages".into()));
        recorder.record_truncated_response(3);
        recorder.set_turns(3);

        let report = recorder.finalize(Outcome::Success, Some("done".into()), None);
        let json = serde_json::to_string(&report).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["result"]["outcome"], "success");
        assert_eq!(parsed["result"]["exit_code"], 0);
        assert_eq!(parsed["timeline"][0]["type"], "llm_call");
        assert_eq!(parsed["timeline"][0]["turn"], 1);
        assert_eq!(parsed["timeline"][2]["is_retry"], true);
        assert_eq!(parsed["timeline"][2]["retry_reason"], "compact_messages");
        assert_eq!(parsed["timeline"][3]["type"], "truncated_response");

        // Bit-stable under re-serialisation.
        let reparsed: Value = serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn atomic_write_produces_valid_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("report.json");
        let recorder = ReportRecorder::new("t".into(), "m".into(), "p".into(), settings());
        let report = recorder.finalize(Outcome::Exhausted, None, None);
        report.write_atomic(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["result"]["exit_code"], 2);
        assert_eq!(parsed["result"]["answer"], Value::Null);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

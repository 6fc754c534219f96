//! End-to-end loop scenarios driven by a scripted provider.

mod common;

use common::{Step, build_runner, call, edit_args, text_response, tool_response};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

fn timeline_of(report: &Value, kind: &str) -> Vec<Value> {
    report["timeline"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| entry["type"] == kind)
        .cloned()
        .collect()
}

#[tokio::test]
async fn read_before_write_guard_round_trip() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("src")).unwrap();
    std::fs::write(tmp.path().join("src/x.txt"), "line TARGET end\n").unwrap();

    let steps = vec![
        Step::Respond(tool_response(vec![call(
            "c1",
            "edit_file",
            edit_args("src/x.txt"),
        )])),
        Step::Respond(tool_response(vec![call(
            "c2",
            "read_file",
            json!({"path": "src/x.txt"}),
        )])),
        Step::Respond(tool_response(vec![call(
            "c3",
            "edit_file",
            edit_args("src/x.txt"),
        )])),
        Step::Respond(text_response("edited the file")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("modify src/x.txt").await;
    assert_eq!(summary.outcome.exit_code(), 0);
    assert_eq!(summary.answer.as_deref(), Some("edited the file"));

    let content = std::fs::read_to_string(tmp.path().join("src/x.txt")).unwrap();
    assert!(content.contains("REPLACED"));

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    assert_eq!(report["stats"]["tool_calls_failed"], 1);
    assert_eq!(report["stats"]["tool_calls_succeeded"], 2);

    let tool_events = timeline_of(&report, "tool_call");
    assert_eq!(tool_events[0]["succeeded"], false);
    assert_eq!(tool_events[0]["error"], "UnreadTarget");
    assert_eq!(tool_events[1]["name"], "read_file");
    assert_eq!(tool_events[1]["succeeded"], true);
    assert_eq!(tool_events[2]["succeeded"], true);
}

#[tokio::test]
async fn overflow_recovers_through_level_one_compaction() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("big.txt"), "data line\n".repeat(500)).unwrap();

    let steps = vec![
        Step::Respond(tool_response(vec![call(
            "c1",
            "read_file",
            json!({"path": "big.txt"}),
        )])),
        Step::Respond(tool_response(vec![call(
            "c2",
            "read_file",
            json!({"path": "big.txt"}),
        )])),
        Step::Respond(tool_response(vec![call(
            "c3",
            "read_file",
            json!({"path": "big.txt"}),
        )])),
        Step::Overflow,
        Step::Respond(text_response("summarised the data")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("inspect big.txt").await;
    assert_eq!(summary.answer.as_deref(), Some("summarised the data"));

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();

    let compactions = timeline_of(&report, "compaction");
    assert_eq!(compactions.len(), 1);
    assert_eq!(compactions[0]["strategy"], "compact_messages");
    assert!(
        compactions[0]["tokens_after"].as_u64().unwrap()
            < compactions[0]["tokens_before"].as_u64().unwrap()
    );

    let llm_calls = timeline_of(&report, "llm_call");
    let retry = llm_calls
        .iter()
        .find(|event| event["is_retry"] == true)
        .expect("a retry call after compaction");
    assert_eq!(retry["retry_reason"], "compact_messages");

    // Retries do not add turns.
    let turns = report["stats"]["turns"].as_u64().unwrap();
    let calls = report["stats"]["llm_calls"].as_u64().unwrap();
    assert!(calls > turns);
}

#[tokio::test]
async fn run_exhausts_at_max_turns() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "hello\n").unwrap();

    let steps = (0..5)
        .map(|i| {
            Step::Respond(tool_response(vec![call(
                &format!("c{i}"),
                "read_file",
                json!({"path": "a.txt"}),
            )]))
        })
        .collect();

    let mut runner = build_runner(tmp.path(), steps, 3);
    let summary = runner.run_task("never finish").await;
    assert_eq!(summary.outcome.exit_code(), 2);
    assert!(summary.answer.is_none());

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    assert_eq!(report["result"]["outcome"], "exhausted");
    assert_eq!(report["result"]["answer"], Value::Null);
    assert_eq!(report["stats"]["turns"], 3);
    assert!(report["stats"]["llm_calls"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn repeated_identical_failures_hit_the_guardrail() {
    let tmp = TempDir::new().unwrap();
    // The target never exists, so every edit fails identically.
    let steps = vec![
        Step::Respond(tool_response(vec![call(
            "c1",
            "edit_file",
            edit_args("missing.txt"),
        )])),
        Step::Respond(tool_response(vec![call(
            "c2",
            "edit_file",
            edit_args("missing.txt"),
        )])),
        Step::Respond(tool_response(vec![call(
            "c3",
            "edit_file",
            edit_args("missing.txt"),
        )])),
        Step::Respond(text_response("giving up")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("edit a ghost file").await;

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    let guardrails = timeline_of(&report, "guardrail");
    assert_eq!(guardrails.len(), 2);
    assert_eq!(guardrails[0]["level"], "nudge");
    assert_eq!(guardrails[1]["level"], "stop");
    assert_eq!(guardrails[1]["tool"], "edit_file");
    assert_eq!(report["stats"]["guardrail_interventions"], 2);
}

#[tokio::test]
async fn invalid_json_arguments_are_recorded_as_failures() {
    let tmp = TempDir::new().unwrap();
    let steps = vec![
        Step::Respond(tool_response(vec![swival_core::llm::ToolCall {
            id: "c1".to_string(),
            name: "read_file".to_string(),
            arguments: None,
        }])),
        Step::Respond(text_response("noted")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("garbled call").await;

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    let tool_events = timeline_of(&report, "tool_call");
    assert_eq!(tool_events[0]["succeeded"], false);
    assert_eq!(tool_events[0]["arguments"], Value::Null);
    assert_eq!(tool_events[0]["error"], "InvalidToolArguments");
}

#[tokio::test]
async fn truncated_response_lets_the_model_continue() {
    let tmp = TempDir::new().unwrap();
    let steps = vec![
        Step::Respond(swival_core::llm::CompletionResponse {
            content: Some("the answer starts here".to_string()),
            tool_calls: Vec::new(),
            finish_reason: swival_core::llm::FinishReason::Length,
        }),
        Step::Respond(text_response("and ends here")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("long answer").await;
    assert_eq!(summary.answer.as_deref(), Some("and ends here"));

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    assert_eq!(report["stats"]["truncated_responses"], 1);
    assert_eq!(timeline_of(&report, "truncated_response").len(), 1);
}

#[tokio::test]
async fn tool_call_counters_reconcile() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "content TARGET here\n").unwrap();

    let steps = vec![
        Step::Respond(tool_response(vec![
            call("c1", "read_file", json!({"path": "a.txt"})),
            call("c2", "list_dir", json!({"path": "."})),
        ])),
        Step::Respond(tool_response(vec![
            call("c3", "edit_file", edit_args("a.txt")),
            call("c4", "read_file", json!({"path": "nope.txt"})),
        ])),
        Step::Respond(text_response("done")),
    ];

    let mut runner = build_runner(tmp.path(), steps, 10);
    let summary = runner.run_task("mixed outcomes").await;

    let report = serde_json::to_value(runner.into_report(&summary)).unwrap();
    let stats = &report["stats"];
    let total = stats["tool_calls_total"].as_u64().unwrap();
    let succeeded = stats["tool_calls_succeeded"].as_u64().unwrap();
    let failed = stats["tool_calls_failed"].as_u64().unwrap();
    assert_eq!(total, 4);
    assert_eq!(succeeded + failed, total);

    let by_name_sum: u64 = stats["tool_calls_by_name"]
        .as_object()
        .unwrap()
        .values()
        .map(|counts| {
            counts["succeeded"].as_u64().unwrap() + counts["failed"].as_u64().unwrap()
        })
        .sum();
    assert_eq!(by_name_sum, total);
}

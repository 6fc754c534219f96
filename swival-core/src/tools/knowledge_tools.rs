//! Tools that operate on the knowledge channels instead of the transcript.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ToolError, ToolErrorKind};
use crate::knowledge::{SnapshotRecap, TodoState};
use crate::session::SessionContext;

use super::traits::{Tool, parse_args};

#[derive(Debug, Deserialize)]
struct ThinkArgs {
    thought: String,
    #[serde(default)]
    revise_of: Option<usize>,
    #[serde(default)]
    branch_of: Option<usize>,
}

pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> &'static str {
        "Record a numbered thinking step. Reference an earlier step with revise_of or branch_of."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {"type": "string"},
                "revise_of": {"type": "integer", "description": "Step number this revises"},
                "branch_of": {"type": "integer", "description": "Step number this branches from"}
            },
            "required": ["thought"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: ThinkArgs = parse_args(args)?;
        let number =
            session
                .knowledge
                .thinking
                .lock()
                .think(args.thought, args.revise_of, args.branch_of);
        Ok(format!("Recorded thinking step {number}."))
    }
}

#[derive(Debug, Deserialize)]
struct TodoArgs {
    action: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<usize>,
    #[serde(default)]
    state: Option<String>,
}

pub struct TodoTool;

#[async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn description(&self) -> &'static str {
        "Manage the todo list: add an item, set its state (pending, in-progress, done, cancelled), or list everything."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["add", "set_state", "list"]},
                "text": {"type": "string", "description": "Item text (add)"},
                "id": {"type": "integer", "description": "Item id (set_state)"},
                "state": {"type": "string", "enum": ["pending", "in-progress", "done", "cancelled"]}
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: TodoArgs = parse_args(args)?;
        let turn = session.current_turn();
        let mut todos = session.knowledge.todos.lock();
        match args.action.as_str() {
            "add" => {
                let text = args.text.ok_or_else(|| {
                    ToolError::new(ToolErrorKind::InvalidToolArguments, "add requires text")
                })?;
                let id = todos.add(text, turn);
                Ok(format!("Added todo #{id}."))
            }
            "set_state" => {
                let id = args.id.ok_or_else(|| {
                    ToolError::new(ToolErrorKind::InvalidToolArguments, "set_state requires id")
                })?;
                let state = args
                    .state
                    .as_deref()
                    .and_then(TodoState::parse)
                    .ok_or_else(|| {
                        ToolError::new(
                            ToolErrorKind::InvalidToolArguments,
                            "state must be pending, in-progress, done, or cancelled",
                        )
                    })?;
                if todos.set_state(id, state, turn) {
                    Ok(format!("Todo #{id} updated."))
                } else {
                    Err(ToolError::other(format!("no todo with id {id}")))
                }
            }
            "list" => {
                todos.touch(turn);
                let rendered = todos.render(turn);
                Ok(if rendered.is_empty() {
                    "No todos.".to_string()
                } else {
                    rendered
                })
            }
            other => Err(ToolError::new(
                ToolErrorKind::InvalidToolArguments,
                format!("unknown todo action '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    action: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    force: Option<bool>,
}

pub struct SnapshotTool;

#[async_trait]
impl Tool for SnapshotTool {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn description(&self) -> &'static str {
        "Manage a conversation snapshot: save opens a labeled scope, restore collapses it into a recap (summary required), cancel discards it, status reports it."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["save", "restore", "cancel", "status"]},
                "label": {"type": "string", "description": "Scope label (save)"},
                "summary": {"type": "string", "description": "Recap text (restore)"},
                "force": {"type": "boolean", "description": "Collapse a dirty scope (restore)"}
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: SnapshotArgs = parse_args(args)?;
        let turn = session.current_turn();
        let mut snapshots = session.snapshots.lock();
        match args.action.as_str() {
            "save" => {
                let label = args.label.ok_or_else(|| {
                    ToolError::new(ToolErrorKind::InvalidToolArguments, "save requires a label")
                })?;
                snapshots
                    .save(label.clone(), turn)
                    .map_err(|err| ToolError::other(err.to_string()))?;
                Ok(format!("Snapshot '{label}' opened at turn {turn}."))
            }
            "restore" => {
                let summary = args.summary.ok_or_else(|| {
                    ToolError::new(
                        ToolErrorKind::InvalidToolArguments,
                        "restore requires a summary",
                    )
                })?;
                let collapse = snapshots
                    .restore(
                        summary,
                        args.force.unwrap_or(false),
                        turn,
                        session.idle_restore_start(),
                    )
                    .map_err(|err| ToolError::other(err.to_string()))?;

                session.knowledge.recaps.lock().push(SnapshotRecap {
                    label: collapse.label.clone(),
                    summary: collapse.summary.clone(),
                    turn_range: (collapse.from_turn, collapse.to_turn),
                });
                let detail = format!(
                    "Collapsed turns {}-{} of '{}' into a recap.",
                    collapse.from_turn, collapse.to_turn, collapse.label
                );
                session.stash_collapse(collapse);
                Ok(detail)
            }
            "cancel" => {
                if snapshots.cancel() {
                    Ok("Snapshot cancelled.".to_string())
                } else {
                    Ok("No active snapshot to cancel.".to_string())
                }
            }
            "status" => Ok(snapshots.status()),
            other => Err(ToolError::new(
                ToolErrorKind::InvalidToolArguments,
                format!("unknown snapshot action '{other}'"),
            )),
        }
    }
}

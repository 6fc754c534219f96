//! Knowledge channels: out-of-band stores injected into the system prompt
//! on every turn, immune to transcript compaction.

pub mod recaps;
pub mod thinking;
pub mod todos;

use parking_lot::Mutex;
use std::path::Path;

pub use recaps::{CheckpointStore, CheckpointSummary, RecapStore, SnapshotRecap};
pub use thinking::{StepRelation, ThinkingLog, ThinkingStep};
pub use todos::{TodoItem, TodoState, TodoStore};

/// All four channels bundled behind interior mutability so tools can write
/// through a shared session handle.
pub struct KnowledgeChannels {
    pub thinking: Mutex<ThinkingLog>,
    pub todos: Mutex<TodoStore>,
    pub recaps: Mutex<RecapStore>,
    pub checkpoints: Mutex<CheckpointStore>,
}

impl KnowledgeChannels {
    pub fn new(scratch_dir: &Path) -> Self {
        Self {
            thinking: Mutex::new(ThinkingLog::new()),
            todos: Mutex::new(TodoStore::new(scratch_dir.join("todo.md"))),
            recaps: Mutex::new(RecapStore::default()),
            checkpoints: Mutex::new(CheckpointStore::default()),
        }
    }

    /// The serialization hook: one block per non-empty channel, appended to
    /// the system prompt each turn.
    pub fn render_for_system_prompt(&self, current_turn: usize) -> String {
        let mut blocks = Vec::new();
        let thinking = self.thinking.lock().render();
        if !thinking.is_empty() {
            blocks.push(thinking);
        }
        let todos = self.todos.lock().render(current_turn);
        if !todos.is_empty() {
            blocks.push(todos);
        }
        let recaps = self.recaps.lock().render();
        if !recaps.is_empty() {
            blocks.push(recaps);
        }
        let checkpoints = self.checkpoints.lock().render();
        if !checkpoints.is_empty() {
            blocks.push(checkpoints);
        }
        blocks.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn recaps_appear_in_every_subsequent_render() {
        let tmp = TempDir::new().unwrap();
        let channels = KnowledgeChannels::new(tmp.path());
        channels.recaps.lock().push(SnapshotRecap {
            label: "refactor".into(),
            summary: "moved the parser into its own module".into(),
            turn_range: (3, 7),
        });

        for turn in 8..12 {
            let rendered = channels.render_for_system_prompt(turn);
            assert!(rendered.contains("refactor"));
        }
    }

    #[test]
    fn empty_channels_render_nothing() {
        let tmp = TempDir::new().unwrap();
        let channels = KnowledgeChannels::new(tmp.path());
        assert!(channels.render_for_system_prompt(1).is_empty());
    }
}

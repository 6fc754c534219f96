//! The todo list, mirrored to `.swival/todo.md`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::config::constants::TODO_REMINDER_AFTER_TURNS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoState {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl TodoState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in-progress" | "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Done => "[x]",
            Self::Cancelled => "[-]",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: usize,
    pub text: String,
    pub state: TodoState,
}

#[derive(Debug)]
pub struct TodoStore {
    items: Vec<TodoItem>,
    next_id: usize,
    mirror_path: PathBuf,
    last_interaction_turn: usize,
}

impl TodoStore {
    pub fn new(mirror_path: PathBuf) -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            mirror_path,
            last_interaction_turn: 0,
        }
    }

    pub fn add(&mut self, text: String, turn: usize) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(TodoItem {
            id,
            text,
            state: TodoState::Pending,
        });
        self.last_interaction_turn = turn;
        self.mirror();
        id
    }

    pub fn set_state(&mut self, id: usize, state: TodoState, turn: usize) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        item.state = state;
        self.last_interaction_turn = turn;
        self.mirror();
        true
    }

    pub fn touch(&mut self, turn: usize) {
        self.last_interaction_turn = turn;
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn has_open_items(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item.state, TodoState::Pending | TodoState::InProgress))
    }

    /// The reminder fires once at least three turns have passed since the
    /// last todo interaction while open items remain.
    pub fn reminder_due(&self, current_turn: usize) -> bool {
        self.has_open_items()
            && current_turn.saturating_sub(self.last_interaction_turn) >= TODO_REMINDER_AFTER_TURNS
    }

    pub fn render(&self, current_turn: usize) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Todos\n");
        for item in &self.items {
            out.push_str(&format!("{} #{} {}\n", item.state.marker(), item.id, item.text));
        }
        if self.reminder_due(current_turn) {
            out.push_str(
                "Reminder: open todo items have not been touched for several turns — update or close them.\n",
            );
        }
        out
    }

    /// Atomic mirror: write next to the target, then rename over it.
    fn mirror(&self) {
        let mut body = String::from("# Todos\n\n");
        for item in &self.items {
            body.push_str(&format!("- {} {}\n", item.state.marker(), item.text));
        }

        if let Some(parent) = self.mirror_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(error = %err, "failed to create todo mirror directory");
                return;
            }
        }
        let tmp = self.mirror_path.with_extension("md.tmp");
        if let Err(err) =
            std::fs::write(&tmp, &body).and_then(|_| std::fs::rename(&tmp, &self.mirror_path))
        {
            warn!(error = %err, path = %self.mirror_path.display(), "failed to mirror todo list");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_and_transition_mirrors_to_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".swival/todo.md");
        let mut store = TodoStore::new(path.clone());

        let id = store.add("wire the config loader".into(), 1);
        assert!(std::fs::read_to_string(&path).unwrap().contains("[ ] wire"));

        assert!(store.set_state(id, TodoState::Done, 2));
        assert!(std::fs::read_to_string(&path).unwrap().contains("[x] wire"));
    }

    #[test]
    fn reminder_fires_after_three_idle_turns_with_open_items() {
        let tmp = TempDir::new().unwrap();
        let mut store = TodoStore::new(tmp.path().join("todo.md"));
        store.add("pending work".into(), 2);

        assert!(!store.reminder_due(3));
        assert!(!store.reminder_due(4));
        assert!(store.reminder_due(5));
    }

    #[test]
    fn no_reminder_when_everything_closed() {
        let tmp = TempDir::new().unwrap();
        let mut store = TodoStore::new(tmp.path().join("todo.md"));
        let id = store.add("short task".into(), 1);
        store.set_state(id, TodoState::Done, 1);
        assert!(!store.reminder_due(10));
    }

    #[test]
    fn unknown_id_is_reported() {
        let tmp = TempDir::new().unwrap();
        let mut store = TodoStore::new(tmp.path().join("todo.md"));
        assert!(!store.set_state(99, TodoState::Done, 1));
    }
}

//! Out-of-band thinking steps.

use serde::{Deserialize, Serialize};

/// How a step relates to an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRelation {
    Revises,
    Branches,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub number: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<(StepRelation, usize)>,
}

/// Append-only numbered list of thinking steps, linear with branches.
/// Revisions and branches reference earlier steps by number, never by
/// pointer, so compaction of the transcript cannot invalidate them.
#[derive(Debug, Default)]
pub struct ThinkingLog {
    steps: Vec<ThinkingStep>,
}

/// Past this many steps the rendered history elides the oldest entries.
const RENDER_TAIL: usize = 30;

impl ThinkingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step and return its number (1-based).
    pub fn think(
        &mut self,
        text: String,
        revise_of: Option<usize>,
        branch_of: Option<usize>,
    ) -> usize {
        let number = self.steps.len() + 1;
        let parent = match (revise_of, branch_of) {
            (Some(n), _) => Some((StepRelation::Revises, n)),
            (None, Some(n)) => Some((StepRelation::Branches, n)),
            (None, None) => None,
        };
        self.steps.push(ThinkingStep {
            number,
            text,
            parent,
        });
        number
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn render(&self) -> String {
        if self.steps.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Thinking steps\n");
        let skipped = self.steps.len().saturating_sub(RENDER_TAIL);
        if skipped > 0 {
            out.push_str(&format!("({skipped} earlier steps omitted)\n"));
        }
        for step in &self.steps[skipped..] {
            match step.parent {
                Some((StepRelation::Revises, n)) => {
                    out.push_str(&format!("{}. (revises {}) {}\n", step.number, n, step.text));
                }
                Some((StepRelation::Branches, n)) => {
                    out.push_str(&format!("{}. (branch of {}) {}\n", step.number, n, step.text));
                }
                None => out.push_str(&format!("{}. {}\n", step.number, step.text)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_sequential() {
        let mut log = ThinkingLog::new();
        assert_eq!(log.think("first".into(), None, None), 1);
        assert_eq!(log.think("second".into(), None, None), 2);
        assert_eq!(log.think("fix".into(), Some(1), None), 3);
    }

    #[test]
    fn render_marks_revisions_and_branches() {
        let mut log = ThinkingLog::new();
        log.think("explore".into(), None, None);
        log.think("alternative".into(), None, Some(1));
        let rendered = log.render();
        assert!(rendered.contains("2. (branch of 1) alternative"));
    }
}

//! Snapshot recaps and proactive checkpoint summaries.
//!
//! Both stores are rendered into the system prompt every turn, which is what
//! lets them survive every compaction level.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::constants::CHECKPOINT_SUMMARY_TOKEN_CAP;
use crate::core::token_estimator::TokenEstimator;
use crate::llm::LlmProvider;

/// The collapsed summary of a snapshot scope. Immutable once finalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecap {
    pub label: String,
    pub summary: String,
    pub turn_range: (usize, usize),
}

#[derive(Debug, Default)]
pub struct RecapStore {
    recaps: Vec<SnapshotRecap>,
}

impl RecapStore {
    pub fn push(&mut self, recap: SnapshotRecap) {
        self.recaps.push(recap);
    }

    pub fn recaps(&self) -> &[SnapshotRecap] {
        &self.recaps
    }

    pub fn render(&self) -> String {
        if self.recaps.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Snapshot recaps\n");
        for recap in &self.recaps {
            out.push_str(&format!(
                "- [{}] (turns {}-{}): {}\n",
                recap.label, recap.turn_range.0, recap.turn_range.1, recap.summary
            ));
        }
        out
    }
}

/// A proactive summary of a batch of completed turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub turn_range: (usize, usize),
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointStore {
    summaries: Vec<CheckpointSummary>,
}

impl CheckpointStore {
    pub fn push(&mut self, summary: CheckpointSummary) {
        self.summaries.push(summary);
    }

    pub fn summaries(&self) -> &[CheckpointSummary] {
        &self.summaries
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// The summary whose turn range overlaps the given span the most, used
    /// as the compaction fallback when the live summarisation call fails.
    pub fn most_relevant(&self, range: (usize, usize)) -> Option<&CheckpointSummary> {
        self.summaries
            .iter()
            .max_by_key(|summary| overlap(summary.turn_range, range))
            .filter(|summary| overlap(summary.turn_range, range) > 0)
    }

    pub fn needs_consolidation(&self, estimator: &TokenEstimator) -> bool {
        let total: usize = self
            .summaries
            .iter()
            .map(|s| estimator.estimate_text(&s.text))
            .sum();
        total > CHECKPOINT_SUMMARY_TOKEN_CAP
    }

    /// Merge the oldest half into a single summary (map/reduce). Falls back
    /// to plain concatenation when the summarisation call fails.
    pub async fn consolidate(&mut self, provider: &Arc<dyn LlmProvider>, model: &str) {
        if self.summaries.len() < 2 {
            return;
        }
        let half = self.summaries.len() / 2;
        let oldest: Vec<CheckpointSummary> = self.summaries.drain(..half).collect();
        let range = (
            oldest.first().map(|s| s.turn_range.0).unwrap_or(1),
            oldest.last().map(|s| s.turn_range.1).unwrap_or(1),
        );

        let joined = oldest
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt = format!(
            "Merge these progress summaries into one. Preserve decisions, file paths, commands, and open questions. Be concise.\n\n{joined}"
        );

        let text = match provider.summarize(model, prompt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) | Err(_) => {
                warn!("checkpoint consolidation call failed; concatenating instead");
                joined
            }
        };

        self.summaries.insert(
            0,
            CheckpointSummary {
                turn_range: range,
                text,
            },
        );
    }

    pub fn render(&self) -> String {
        if self.summaries.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Progress checkpoints\n");
        for summary in &self.summaries {
            out.push_str(&format!(
                "- turns {}-{}: {}\n",
                summary.turn_range.0, summary.turn_range.1, summary.text
            ));
        }
        out
    }
}

fn overlap(a: (usize, usize), b: (usize, usize)) -> usize {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    end.saturating_sub(start.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_relevant_picks_largest_overlap() {
        let mut store = CheckpointStore::default();
        store.push(CheckpointSummary {
            turn_range: (1, 10),
            text: "early".into(),
        });
        store.push(CheckpointSummary {
            turn_range: (11, 20),
            text: "late".into(),
        });
        let hit = store.most_relevant((12, 18)).unwrap();
        assert_eq!(hit.text, "late");
        assert!(store.most_relevant((30, 40)).is_none());
    }

    #[test]
    fn consolidation_threshold_uses_estimator() {
        let mut store = CheckpointStore::default();
        let estimator = TokenEstimator;
        assert!(!store.needs_consolidation(&estimator));
        store.push(CheckpointSummary {
            turn_range: (1, 10),
            text: "x".repeat(CHECKPOINT_SUMMARY_TOKEN_CAP * 4 + 64),
        });
        assert!(store.needs_consolidation(&estimator));
    }
}

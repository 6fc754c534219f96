//! Snapshot controller: a user-labeled scope over the conversation that can
//! be collapsed into a single recap.
//!
//! The controller references turns by index, never by message pointer, so
//! compaction rewriting content cannot invalidate a checkpoint. The actual
//! transcript collapse is carried out by the agent loop, which applies the
//! [`CollapseRequest`] this controller hands back at a turn boundary.

use thiserror::Error;

use crate::config::constants::READ_STREAK_NUDGE_AT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub label: String,
    pub turn_index: usize,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SnapshotState {
    #[default]
    Idle,
    Active(Checkpoint),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotOpError {
    #[error("AlreadyActive: snapshot '{0}' is already open; restore or cancel it first")]
    AlreadyActive(String),
    #[error("dirty scope: the snapshot contains writes; pass force=true to collapse it")]
    DirtyScope,
}

/// Span of turns the loop should collapse into one recap message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseRequest {
    pub label: String,
    pub summary: String,
    pub from_turn: usize,
    pub to_turn: usize,
}

#[derive(Debug, Default)]
pub struct SnapshotController {
    state: SnapshotState,
    /// Turn of the most recent restore collapse; the start anchor for an
    /// idle restore.
    last_boundary: Option<usize>,
    read_streak: usize,
    nudged_this_streak: bool,
}

impl SnapshotController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    pub fn save(&mut self, label: String, current_turn: usize) -> Result<(), SnapshotOpError> {
        match &self.state {
            SnapshotState::Active(checkpoint) => {
                Err(SnapshotOpError::AlreadyActive(checkpoint.label.clone()))
            }
            SnapshotState::Idle => {
                self.state = SnapshotState::Active(Checkpoint {
                    label,
                    turn_index: current_turn,
                    dirty: false,
                });
                Ok(())
            }
        }
    }

    /// Collapse the active scope (or, when idle, everything since the last
    /// restore boundary / `idle_start`) into a recap.
    pub fn restore(
        &mut self,
        summary: String,
        force: bool,
        current_turn: usize,
        idle_start: usize,
    ) -> Result<CollapseRequest, SnapshotOpError> {
        let (label, from_turn) = match &self.state {
            SnapshotState::Active(checkpoint) => {
                if checkpoint.dirty && !force {
                    return Err(SnapshotOpError::DirtyScope);
                }
                (checkpoint.label.clone(), checkpoint.turn_index)
            }
            SnapshotState::Idle => (
                "(unlabeled)".to_string(),
                self.last_boundary.map(|b| b + 1).unwrap_or(idle_start),
            ),
        };
        self.state = SnapshotState::Idle;
        self.last_boundary = Some(current_turn);
        Ok(CollapseRequest {
            label,
            summary,
            from_turn,
            to_turn: current_turn,
        })
    }

    /// Returns false when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            SnapshotState::Active(_) => {
                self.state = SnapshotState::Idle;
                true
            }
            SnapshotState::Idle => false,
        }
    }

    pub fn status(&self) -> String {
        match &self.state {
            SnapshotState::Idle => "no active snapshot".to_string(),
            SnapshotState::Active(checkpoint) => format!(
                "snapshot '{}' open since turn {}{}",
                checkpoint.label,
                checkpoint.turn_index,
                if checkpoint.dirty { " (dirty)" } else { "" }
            ),
        }
    }

    /// Called by the loop after any successful mutating tool call.
    pub fn mark_dirty(&mut self) {
        if let SnapshotState::Active(checkpoint) = &mut self.state {
            checkpoint.dirty = true;
        }
    }

    /// Feed one completed turn into the read-streak counter. Returns the
    /// nudge text exactly once per streak, at the fifth consecutive
    /// read-only turn.
    pub fn note_turn(&mut self, read_only: bool) -> Option<String> {
        if !read_only {
            self.read_streak = 0;
            self.nudged_this_streak = false;
            return None;
        }
        self.read_streak += 1;
        if self.read_streak == READ_STREAK_NUDGE_AT && !self.nudged_this_streak {
            self.nudged_this_streak = true;
            return Some(
                "You have spent several turns only reading. If the exploration is done, \
                 consider `snapshot restore` to collapse it into a recap and free context."
                    .to_string(),
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_restore_round_trip() {
        let mut ctl = SnapshotController::new();
        ctl.save("explore".into(), 4).unwrap();
        let collapse = ctl.restore("looked around".into(), false, 9, 1).unwrap();
        assert_eq!(collapse.label, "explore");
        assert_eq!(collapse.from_turn, 4);
        assert_eq!(collapse.to_turn, 9);
        assert_eq!(*ctl.state(), SnapshotState::Idle);
    }

    #[test]
    fn double_save_fails_already_active() {
        let mut ctl = SnapshotController::new();
        ctl.save("a".into(), 1).unwrap();
        assert!(matches!(
            ctl.save("b".into(), 2),
            Err(SnapshotOpError::AlreadyActive(_))
        ));
    }

    #[test]
    fn save_cancel_save_equals_single_save() {
        let mut ctl = SnapshotController::new();
        ctl.save("scope".into(), 3).unwrap();
        assert!(ctl.cancel());
        ctl.save("scope".into(), 3).unwrap();

        let SnapshotState::Active(checkpoint) = ctl.state() else {
            panic!("expected active state");
        };
        assert_eq!(checkpoint.label, "scope");
        assert_eq!(checkpoint.turn_index, 3);
        assert!(!checkpoint.dirty);
    }

    #[test]
    fn dirty_scope_requires_force() {
        let mut ctl = SnapshotController::new();
        ctl.save("edit".into(), 2).unwrap();
        ctl.mark_dirty();
        assert_eq!(
            ctl.restore("s".into(), false, 5, 1),
            Err(SnapshotOpError::DirtyScope)
        );
        assert!(ctl.restore("s".into(), true, 5, 1).is_ok());
    }

    #[test]
    fn idle_restore_starts_after_previous_boundary() {
        let mut ctl = SnapshotController::new();
        ctl.save("first".into(), 2).unwrap();
        ctl.restore("one".into(), false, 5, 1).unwrap();

        let collapse = ctl.restore("two".into(), false, 9, 1).unwrap();
        assert_eq!(collapse.from_turn, 6);
        assert_eq!(collapse.to_turn, 9);
    }

    #[test]
    fn nudge_fires_once_at_fifth_read_only_turn() {
        let mut ctl = SnapshotController::new();
        for _ in 0..4 {
            assert!(ctl.note_turn(true).is_none());
        }
        assert!(ctl.note_turn(true).is_some());
        assert!(ctl.note_turn(true).is_none());

        // A mutating turn resets the streak; five more reads re-nudge.
        assert!(ctl.note_turn(false).is_none());
        for _ in 0..4 {
            assert!(ctl.note_turn(true).is_none());
        }
        assert!(ctl.note_turn(true).is_some());
    }
}

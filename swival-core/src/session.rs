//! Session-scoped state bundle.
//!
//! Everything a tool may touch (path policy, read tracker, output caps,
//! knowledge channels, snapshot controller) travels in one
//! [`SessionContext`] passed explicitly through the loop. No ambient
//! singletons.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::config::constants::SCRATCH_DIR_NAME;
use crate::knowledge::KnowledgeChannels;
use crate::snapshot::{CollapseRequest, SnapshotController};
use crate::tools::output_caps::OutputCaps;
use crate::tools::path_policy::PathPolicy;
use crate::tools::read_tracker::ReadTracker;

pub struct SessionContext {
    pub paths: PathPolicy,
    pub reads: ReadTracker,
    pub caps: OutputCaps,
    pub knowledge: KnowledgeChannels,
    pub snapshots: Mutex<SnapshotController>,
    pub cancel: CancellationToken,
    scratch_dir: PathBuf,
    no_read_guard: bool,
    yolo: bool,
    current_turn: AtomicUsize,
    /// Turn of the most recent user message; the start anchor when the
    /// snapshot tool restores without an open checkpoint.
    idle_restore_start: AtomicUsize,
    pending_collapse: Mutex<Option<CollapseRequest>>,
}

impl SessionContext {
    pub fn new(paths: PathPolicy, no_read_guard: bool, yolo: bool) -> Self {
        let scratch_dir = paths.base_dir().join(SCRATCH_DIR_NAME);
        Self {
            reads: ReadTracker::new(),
            caps: OutputCaps::new(scratch_dir.clone()),
            knowledge: KnowledgeChannels::new(&scratch_dir),
            snapshots: Mutex::new(SnapshotController::new()),
            cancel: CancellationToken::new(),
            paths,
            scratch_dir,
            no_read_guard,
            yolo,
            current_turn: AtomicUsize::new(1),
            idle_restore_start: AtomicUsize::new(1),
            pending_collapse: Mutex::new(None),
        }
    }

    pub fn scratch_dir(&self) -> &PathBuf {
        &self.scratch_dir
    }

    pub fn read_guard_enabled(&self) -> bool {
        !self.no_read_guard
    }

    pub fn yolo(&self) -> bool {
        self.yolo
    }

    pub fn current_turn(&self) -> usize {
        self.current_turn.load(Ordering::Relaxed)
    }

    pub fn set_current_turn(&self, turn: usize) {
        self.current_turn.store(turn, Ordering::Relaxed);
    }

    pub fn idle_restore_start(&self) -> usize {
        self.idle_restore_start.load(Ordering::Relaxed)
    }

    pub fn set_idle_restore_start(&self, turn: usize) {
        self.idle_restore_start.store(turn, Ordering::Relaxed);
    }

    /// Stashed by the snapshot tool, applied by the loop at the next safe
    /// point in the transcript.
    pub fn stash_collapse(&self, request: CollapseRequest) {
        *self.pending_collapse.lock() = Some(request);
    }

    pub fn take_pending_collapse(&self) -> Option<CollapseRequest> {
        self.pending_collapse.lock().take()
    }
}

//! Session-scoped read-before-write bookkeeping.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Records every canonical path the session has successfully read or
/// written. The write guard consults it before letting a tool overwrite an
/// existing file.
#[derive(Debug, Default)]
pub struct ReadTracker {
    seen: Mutex<HashSet<PathBuf>>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path) {
        self.seen.lock().insert(path.to_path_buf());
    }

    pub fn has_seen(&self, path: &Path) -> bool {
        self.seen.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reports_paths() {
        let tracker = ReadTracker::new();
        let path = Path::new("/work/src/lib.rs");
        assert!(!tracker.has_seen(path));
        tracker.record(path);
        assert!(tracker.has_seen(path));
        assert_eq!(tracker.len(), 1);
    }
}

//! Project instruction files loaded into the system prompt.

use std::path::Path;
use tracing::debug;

use crate::config::constants::{INSTRUCTION_FILE_CHAR_CAP, SCRATCH_DIR_NAME};

/// Instruction sources checked in order; later files refine earlier ones.
const INSTRUCTION_FILES: &[&str] = &["AGENTS.md"];

/// Load instruction files from the base directory (and its scratch
/// directory), each truncated to the character cap. Returns (name, content)
/// pairs in load order.
pub fn load_instruction_files(base_dir: &Path) -> Vec<(String, String)> {
    let mut loaded = Vec::new();
    let candidates = INSTRUCTION_FILES
        .iter()
        .map(|name| (name.to_string(), base_dir.join(name)))
        .chain(INSTRUCTION_FILES.iter().map(|name| {
            (
                format!("{SCRATCH_DIR_NAME}/{name}"),
                base_dir.join(SCRATCH_DIR_NAME).join(name),
            )
        }));

    for (name, path) in candidates {
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let mut content = content;
        if content.chars().count() > INSTRUCTION_FILE_CHAR_CAP {
            content = content.chars().take(INSTRUCTION_FILE_CHAR_CAP).collect();
            content.push_str("\n[instructions truncated at 10000 characters]");
        }
        debug!(file = name.as_str(), "loaded instruction file");
        loaded.push((name, content));
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_and_caps_instruction_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("AGENTS.md"), "x".repeat(12_000)).unwrap();

        let loaded = load_instruction_files(tmp.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "AGENTS.md");
        assert!(loaded[0].1.contains("[instructions truncated"));
        assert!(loaded[0].1.chars().count() < 12_000);
    }

    #[test]
    fn missing_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        assert!(load_instruction_files(tmp.path()).is_empty());
    }
}

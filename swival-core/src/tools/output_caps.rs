//! Per-tool output size limits and the spill area.
//!
//! Caps run after tool execution and before the result enters the message
//! list. Oversize output is written to the scratch directory and replaced
//! inline by a pointer with a pagination hint; spill files are swept once
//! they age out.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::constants::{
    COMMAND_INLINE_CAP, COMMAND_SPILL_CAP, FETCH_INLINE_CAP, FETCH_SPILL_CAP,
    MCP_ERROR_INLINE_CAP, MCP_RESULT_INLINE_CAP, MCP_RESULT_SPILL_CAP, SPILL_MAX_AGE_SECS,
};

const SPILL_PREFIXES: &[&str] = &["cmd_output_", "fetch_raw_"];

#[derive(Debug, Clone)]
pub struct OutputCaps {
    scratch_dir: PathBuf,
}

impl OutputCaps {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Cap command output: 10 KB inline, up to 1 MB spilled.
    pub fn cap_command_output(&self, text: &str) -> String {
        self.cap_with_spill(text, COMMAND_INLINE_CAP, COMMAND_SPILL_CAP, "cmd_output_")
    }

    /// Cap an MCP tool result: 20 KB inline, up to 10 MB spilled.
    pub fn cap_mcp_result(&self, text: &str) -> String {
        self.cap_with_spill(
            text,
            MCP_RESULT_INLINE_CAP,
            MCP_RESULT_SPILL_CAP,
            "cmd_output_",
        )
    }

    /// MCP errors are truncated inline and never written to disk.
    pub fn cap_mcp_error(&self, text: &str) -> String {
        if text.len() <= MCP_ERROR_INLINE_CAP {
            return text.to_string();
        }
        let head = truncate_at_boundary(text, MCP_ERROR_INLINE_CAP);
        format!("{head}\n[error truncated at 20 KB]")
    }

    /// Cap converted fetch output, spilling the raw body separately.
    pub fn cap_fetch_output(&self, converted: &str, raw: &[u8]) -> String {
        if converted.len() <= FETCH_INLINE_CAP {
            return converted.to_string();
        }
        let head = truncate_at_boundary(converted, FETCH_INLINE_CAP);
        let capped_raw = &raw[..raw.len().min(FETCH_SPILL_CAP)];
        match self.spill_bytes(capped_raw, "fetch_raw_") {
            Some(path) => format!(
                "{head}\n[output truncated at 50 KB; raw body saved to {} — use read_file with offset/limit to page through it]",
                path.display()
            ),
            None => format!("{head}\n[output truncated at 50 KB]"),
        }
    }

    fn cap_with_spill(&self, text: &str, inline_cap: usize, spill_cap: usize, prefix: &str) -> String {
        if text.len() <= inline_cap {
            return text.to_string();
        }
        let head = truncate_at_boundary(text, inline_cap);
        let spill_body = truncate_at_boundary(text, spill_cap);
        match self.spill_bytes(spill_body.as_bytes(), prefix) {
            Some(path) => format!(
                "{head}\n[output truncated at {} KB; full output ({} bytes) saved to {} — use read_file with offset/limit to page through it]",
                inline_cap / 1024,
                spill_body.len(),
                path.display()
            ),
            None => format!("{head}\n[output truncated at {} KB]", inline_cap / 1024),
        }
    }

    fn spill_bytes(&self, bytes: &[u8], prefix: &str) -> Option<PathBuf> {
        self.sweep_stale();
        if let Err(err) = std::fs::create_dir_all(&self.scratch_dir) {
            warn!(error = %err, "failed to create scratch directory for spill");
            return None;
        }
        let path = self
            .scratch_dir
            .join(format!("{prefix}{}.txt", Uuid::new_v4().simple()));
        match std::fs::write(&path, bytes) {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to write spill file");
                None
            }
        }
    }

    /// Delete spill files older than the sweep age. Invoked before each
    /// spill write and once at shutdown.
    pub fn sweep_stale(&self) {
        let Ok(entries) = std::fs::read_dir(&self.scratch_dir) else {
            return;
        };
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(SPILL_MAX_AGE_SECS))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !SPILL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale {
                debug!(path = %path.display(), "sweeping stale spill file");
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    /// Remove every spill file regardless of age (cancellation cleanup).
    pub fn sweep_all(&self) {
        let Ok(entries) = std::fs::read_dir(&self.scratch_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if SPILL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Truncate on a char boundary at or below `max` bytes.
fn truncate_at_boundary(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_output_stays_inline() {
        let tmp = TempDir::new().unwrap();
        let caps = OutputCaps::new(tmp.path().join(".swival"));
        let text = "ok\n";
        assert_eq!(caps.cap_command_output(text), text);
    }

    #[test]
    fn exactly_at_cap_stays_inline_one_past_spills() {
        let tmp = TempDir::new().unwrap();
        let caps = OutputCaps::new(tmp.path().join(".swival"));

        let at_cap = "a".repeat(COMMAND_INLINE_CAP);
        assert_eq!(caps.cap_command_output(&at_cap), at_cap);

        let past_cap = "a".repeat(COMMAND_INLINE_CAP + 1);
        let result = caps.cap_command_output(&past_cap);
        assert!(result.contains("saved to"));
        let spilled: Vec<_> = std::fs::read_dir(tmp.path().join(".swival"))
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(spilled.len(), 1);
    }

    #[test]
    fn mcp_errors_never_spill() {
        let tmp = TempDir::new().unwrap();
        let caps = OutputCaps::new(tmp.path().join(".swival"));
        let huge = "e".repeat(MCP_ERROR_INLINE_CAP * 2);
        let result = caps.cap_mcp_error(&huge);
        assert!(result.contains("truncated"));
        assert!(!tmp.path().join(".swival").exists());
    }

    #[test]
    fn sweep_all_removes_spill_files() {
        let tmp = TempDir::new().unwrap();
        let caps = OutputCaps::new(tmp.path().join(".swival"));
        let _ = caps.cap_command_output(&"a".repeat(COMMAND_INLINE_CAP + 1));
        caps.sweep_all();
        let remaining: Vec<_> = std::fs::read_dir(tmp.path().join(".swival"))
            .unwrap()
            .flatten()
            .collect();
        assert!(remaining.is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo".repeat(100);
        let out = truncate_at_boundary(&text, 7);
        assert!(out.len() <= 7);
        assert!(text.starts_with(&out));
    }
}

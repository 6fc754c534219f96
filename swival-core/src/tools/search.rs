//! Read-only workspace inspection: directory listing and grep.

use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::constants::LISTING_ENTRY_CAP;
use crate::error::ToolError;
use crate::session::SessionContext;

use super::path_policy::Intent;
use super::traits::{Tool, parse_args};

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    path: String,
}

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &'static str {
        "list_dir"
    }

    fn description(&self) -> &'static str {
        "List a directory. Directories carry a trailing slash; at most 100 entries are returned."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path, relative to the workspace"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: ListDirArgs = parse_args(args)?;
        let resolved = session.paths.resolve(&args.path, Intent::Read)?;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&resolved.absolute)
            .await
            .map_err(|err| ToolError::other(format!("cannot list {}: {err}", args.path)))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| ToolError::other(err.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }

        entries.sort();
        let total = entries.len();
        let mut out = entries
            .into_iter()
            .take(LISTING_ENTRY_CAP)
            .collect::<Vec<_>>()
            .join("\n");
        if total > LISTING_ENTRY_CAP {
            out.push_str(&format!("\n(and {} more entries)", total - LISTING_ENTRY_CAP));
        }
        if out.is_empty() {
            out.push_str("(empty directory)");
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct GrepArgs {
    pattern: String,
    path: String,
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search file contents with a regex. Walks the tree gitignore-aware; at most 100 matching lines are returned."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression"},
                "path": {"type": "string", "description": "File or directory to search"}
            },
            "required": ["pattern", "path"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: GrepArgs = parse_args(args)?;
        let resolved = session.paths.resolve(&args.path, Intent::Read)?;
        let regex = Regex::new(&args.pattern)
            .map_err(|err| ToolError::other(format!("invalid pattern: {err}")))?;

        let root = resolved.absolute.clone();
        let display_base = root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let mut total = 0usize;
            for entry in WalkBuilder::new(&root).build().flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(path) else {
                    continue;
                };
                for (idx, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        total += 1;
                        if matches.len() < LISTING_ENTRY_CAP {
                            let shown = path
                                .strip_prefix(&display_base)
                                .unwrap_or(path)
                                .to_string_lossy();
                            let label = if shown.is_empty() {
                                display_base.to_string_lossy()
                            } else {
                                shown
                            };
                            matches.push(format!("{label}:{}: {}", idx + 1, line.trim_end()));
                        }
                    }
                }
            }
            (matches, total)
        })
        .await
        .map_err(|err| ToolError::other(format!("grep task failed: {err}")))?;

        let (lines, total) = matches;
        if lines.is_empty() {
            return Ok(format!("no matches for '{}'", args.pattern));
        }
        let mut out = lines.join("\n");
        if total > LISTING_ENTRY_CAP {
            out.push_str(&format!(
                "\n(showing {LISTING_ENTRY_CAP} of {total} matching lines)"
            ));
        }
        Ok(out)
    }
}

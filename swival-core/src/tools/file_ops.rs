//! File read/write/edit built-ins.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::constants::{FILE_READ_INLINE_CAP, FILE_READ_LINE_CAP};
use crate::error::{ToolError, ToolErrorKind};
use crate::session::SessionContext;

use super::path_policy::Intent;
use super::traits::{Tool, parse_args};

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a text file. Returns at most 50 KB; use offset (1-based line) and limit to page through larger files."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path, relative to the workspace"},
                "offset": {"type": "integer", "description": "1-based line to start from"},
                "limit": {"type": "integer", "description": "Maximum number of lines"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: ReadFileArgs = parse_args(args)?;
        let resolved = session.paths.resolve(&args.path, Intent::Read)?;

        let bytes = tokio::fs::read(&resolved.absolute)
            .await
            .map_err(|err| ToolError::other(format!("cannot read {}: {err}", args.path)))?;
        let text = String::from_utf8_lossy(&bytes);

        let start = args.offset.unwrap_or(1).max(1) - 1;
        let mut out = String::new();
        let mut lines_taken = 0usize;
        let mut clipped_lines = false;
        let mut hit_cap = false;

        for line in text.lines().skip(start) {
            if let Some(limit) = args.limit {
                if lines_taken >= limit {
                    break;
                }
            }
            let mut rendered = line;
            if rendered.len() > FILE_READ_LINE_CAP {
                let mut end = FILE_READ_LINE_CAP;
                while !rendered.is_char_boundary(end) {
                    end -= 1;
                }
                rendered = &rendered[..end];
                clipped_lines = true;
            }
            if out.len() + rendered.len() + 1 > FILE_READ_INLINE_CAP {
                hit_cap = true;
                break;
            }
            out.push_str(rendered);
            out.push('\n');
            lines_taken += 1;
        }

        session.reads.record(&resolved.absolute);

        if clipped_lines {
            out.push_str("[some lines clipped at 2000 characters]\n");
        }
        if hit_cap {
            out.push_str(&format!(
                "[truncated at 50 KB after {} lines; continue with offset={}]\n",
                lines_taken,
                start + lines_taken + 1
            ));
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    move_from: Option<String>,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file. Overwriting an existing file requires reading it first. Set move_from to rename a file into place."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Destination path"},
                "content": {"type": "string", "description": "Full file content"},
                "move_from": {"type": "string", "description": "Optional source path to rename from"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: WriteFileArgs = parse_args(args)?;
        let dest = session.paths.resolve(&args.path, Intent::Write)?;
        let dest_exists = dest.absolute.exists();

        if dest_exists
            && session.read_guard_enabled()
            && args.move_from.is_none()
            && !session.reads.has_seen(&dest.absolute)
        {
            return Err(ToolError::new(
                ToolErrorKind::UnreadTarget,
                format!("{} exists but has not been read this session", args.path),
            ));
        }

        if let Some(parent) = dest.absolute.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ToolError::other(format!("cannot create {}: {err}", args.path)))?;
        }

        let detail = if let Some(source) = &args.move_from {
            let from = session.paths.resolve(source, Intent::Write)?;
            tokio::fs::rename(&from.absolute, &dest.absolute)
                .await
                .map_err(|err| {
                    ToolError::other(format!("cannot move {source} to {}: {err}", args.path))
                })?;
            if !args.content.is_empty() {
                tokio::fs::write(&dest.absolute, &args.content)
                    .await
                    .map_err(|err| ToolError::other(format!("cannot write {}: {err}", args.path)))?;
            }
            format!("Moved {source} to {}", args.path)
        } else {
            tokio::fs::write(&dest.absolute, &args.content)
                .await
                .map_err(|err| ToolError::other(format!("cannot write {}: {err}", args.path)))?;
            format!("Wrote {} bytes to {}", args.content.len(), args.path)
        };

        session.reads.record(&dest.absolute);
        Ok(detail)
    }
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    old_string: String,
    new_string: String,
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace one exact occurrence of old_string with new_string. The file must have been read this session."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_string": {"type": "string", "description": "Exact text to replace; must match once"},
                "new_string": {"type": "string"}
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: EditFileArgs = parse_args(args)?;
        let resolved = session.paths.resolve(&args.path, Intent::Write)?;

        if !resolved.absolute.exists() {
            return Err(ToolError::other(format!("{} does not exist", args.path)));
        }
        if session.read_guard_enabled() && !session.reads.has_seen(&resolved.absolute) {
            return Err(ToolError::new(
                ToolErrorKind::UnreadTarget,
                format!("{} has not been read this session", args.path),
            ));
        }

        let content = tokio::fs::read_to_string(&resolved.absolute)
            .await
            .map_err(|err| ToolError::other(format!("cannot read {}: {err}", args.path)))?;

        let matches = content.matches(&args.old_string).count();
        if matches == 0 {
            return Err(ToolError::other(format!(
                "old_string not found in {}",
                args.path
            )));
        }
        if matches > 1 {
            return Err(ToolError::other(format!(
                "old_string matches {matches} times in {}; provide more context",
                args.path
            )));
        }

        let updated = content.replacen(&args.old_string, &args.new_string, 1);
        tokio::fs::write(&resolved.absolute, &updated)
            .await
            .map_err(|err| ToolError::other(format!("cannot write {}: {err}", args.path)))?;

        session.reads.record(&resolved.absolute);
        Ok(format!("Edited {}", args.path))
    }
}

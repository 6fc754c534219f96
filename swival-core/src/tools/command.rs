//! Whitelisted subprocess execution.
//!
//! No shell is ever involved: the model supplies an argv array, the first
//! element's basename must be on the allowlist, and the allowlist entry is
//! resolved to an absolute path once at startup. A resolved path inside the
//! base directory is rejected so the agent cannot launder a script it just
//! wrote into an "allowed" command.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::constants::COMMAND_TIMEOUT_SECS;
use crate::error::{ToolError, ToolErrorKind};
use crate::session::SessionContext;

use super::traits::{Tool, parse_args};

#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: HashMap<String, PathBuf>,
    base_dir: PathBuf,
    yolo: bool,
}

impl CommandPolicy {
    /// Resolve the allowlist once at startup. An entry that cannot be
    /// resolved, or that resolves inside the base directory, is a
    /// configuration error.
    pub fn from_allowlist(names: &[String], base_dir: &Path, yolo: bool) -> anyhow::Result<Self> {
        let mut allowed = HashMap::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let resolved = which::which(name).map_err(|err| {
                anyhow::anyhow!("allowed command '{name}' cannot be resolved: {err}")
            })?;
            let canonical = dunce::canonicalize(&resolved).unwrap_or(resolved);
            if canonical.starts_with(base_dir) {
                anyhow::bail!(
                    "allowed command '{name}' resolves inside the base directory ({})",
                    canonical.display()
                );
            }
            allowed.insert(name.to_string(), canonical);
        }
        Ok(Self {
            allowed,
            base_dir: base_dir.to_path_buf(),
            yolo,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn allowed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.allowed.keys().cloned().collect();
        names.sort();
        names
    }

    /// Map the model-supplied argv0 to the program to execute.
    fn resolve(&self, argv0: &str) -> Result<PathBuf, ToolError> {
        if self.yolo {
            return Ok(PathBuf::from(argv0));
        }
        let basename = Path::new(argv0)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ToolError::new(ToolErrorKind::InvalidToolArguments, "empty command name")
            })?;
        let resolved = self.allowed.get(basename).ok_or_else(|| {
            ToolError::new(
                ToolErrorKind::CommandNotAllowed,
                format!("'{basename}' is not on the command allowlist"),
            )
        })?;
        // Re-checked per call: the startup check protects against config
        // mistakes, this one against the binary moving underneath us.
        if resolved.starts_with(&self.base_dir) {
            return Err(ToolError::new(
                ToolErrorKind::CommandNotAllowed,
                format!("'{basename}' resolves inside the base directory"),
            ));
        }
        Ok(resolved.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RunCommandArgs {
    args: Vec<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct RunCommandTool {
    policy: Arc<CommandPolicy>,
}

impl RunCommandTool {
    pub fn new(policy: Arc<CommandPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a whitelisted command. args is an argv array, not a shell line; args[0] must be an allowed command."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Argv array; args[0] is the command"
                },
                "timeout_secs": {"type": "integer", "description": "Wall-clock limit in seconds"}
            },
            "required": ["args"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: RunCommandArgs = parse_args(args)?;
        let Some((argv0, rest)) = args.args.split_first() else {
            return Err(ToolError::new(
                ToolErrorKind::InvalidToolArguments,
                "args must contain at least the command name",
            ));
        };

        let program = self.policy.resolve(argv0)?;
        let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(COMMAND_TIMEOUT_SECS));
        debug!(program = %program.display(), "running command");

        let mut child = tokio::process::Command::new(&program)
            .args(rest)
            .current_dir(session.paths.base_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ToolError::other(format!("failed to spawn '{argv0}': {err}")))?;

        let started = Instant::now();
        let output = tokio::select! {
            result = child.wait_with_output() => result
                .map_err(|err| ToolError::other(format!("failed to collect output: {err}")))?,
            _ = tokio::time::sleep(timeout) => {
                return Err(ToolError::other(format!(
                    "'{argv0}' exceeded the {}s timeout and was killed",
                    timeout.as_secs()
                )));
            }
            _ = session.cancel.cancelled() => {
                return Err(ToolError::other(format!("'{argv0}' cancelled")));
            }
        };

        let mut combined = String::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.is_empty() {
            combined.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push_str("\n--- stderr ---\n");
            }
            combined.push_str(&stderr);
        }

        let capped = session.caps.cap_command_output(&combined);
        debug!(elapsed = ?started.elapsed(), status = ?output.status.code(), "command finished");

        if output.status.success() {
            Ok(if capped.is_empty() {
                "(no output)".to_string()
            } else {
                capped
            })
        } else {
            Err(ToolError::other(format!(
                "'{argv0}' exited with {}\n{capped}",
                output.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_lookup_and_denial() {
        let policy = CommandPolicy {
            allowed: HashMap::from([("cargo".to_string(), PathBuf::from("/usr/bin/cargo"))]),
            base_dir: PathBuf::from("/work/project"),
            yolo: false,
        };
        assert!(policy.resolve("cargo").is_ok());
        assert!(policy.resolve("/somewhere/else/cargo").is_ok());
        let err = policy.resolve("rm").unwrap_err();
        assert_eq!(err.kind(), Some(ToolErrorKind::CommandNotAllowed));
    }

    #[test]
    fn resolved_path_inside_base_dir_is_rejected() {
        let policy = CommandPolicy {
            allowed: HashMap::from([(
                "helper".to_string(),
                PathBuf::from("/work/project/bin/helper"),
            )]),
            base_dir: PathBuf::from("/work/project"),
            yolo: false,
        };
        let err = policy.resolve("helper").unwrap_err();
        assert_eq!(err.kind(), Some(ToolErrorKind::CommandNotAllowed));
    }

    #[test]
    fn yolo_bypasses_the_allowlist() {
        let policy = CommandPolicy {
            allowed: HashMap::new(),
            base_dir: PathBuf::from("/work"),
            yolo: true,
        };
        assert_eq!(policy.resolve("anything").unwrap(), PathBuf::from("anything"));
    }
}

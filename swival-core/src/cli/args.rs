//! CLI argument parsing.

use clap::{Parser, ValueEnum, ValueHint};
use std::path::PathBuf;

use crate::config::constants::defaults;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SandboxKind {
    Agentfs,
}

/// Main CLI structure for swival.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "swival",
    version,
    about = "swival - sandboxed coding agent runtime"
)]
pub struct Cli {
    /// Task for the agent. Omitted when --repl is used.
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Base directory the agent operates in (default: current directory)
    #[arg(long, value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,

    /// Additional read-write root (repeatable)
    #[arg(long = "add-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub add_dirs: Vec<PathBuf>,

    /// Additional read-only root (repeatable)
    #[arg(long = "add-dir-ro", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub add_dirs_ro: Vec<PathBuf>,

    /// Comma-separated command allowlist for run_command
    #[arg(long, value_name = "CSV")]
    pub allowed_commands: Option<String>,

    /// Relaxed sandbox: no command whitelist, no filesystem roots ("/" stays off-limits)
    #[arg(long)]
    pub yolo: bool,

    /// Disable the read-before-write guard
    #[arg(long)]
    pub no_read_guard: bool,

    /// Maximum number of turns before the run is declared exhausted
    #[arg(long, default_value_t = defaults::MAX_TURNS)]
    pub max_turns: usize,

    /// Upper bound on output tokens per completion
    #[arg(long, default_value_t = defaults::MAX_OUTPUT_TOKENS)]
    pub max_output_tokens: usize,

    /// Model context window in tokens
    #[arg(long, default_value_t = defaults::MAX_CONTEXT_TOKENS)]
    pub max_context_tokens: usize,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling parameter
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Sampling seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Summarize every 10 completed turns in the background
    #[arg(long)]
    pub proactive_summaries: bool,

    /// Write the run report JSON here; the answer goes into the report
    /// instead of stdout
    #[arg(long, value_name = "FILE", conflicts_with = "repl")]
    pub report: Option<PathBuf>,

    /// Read prompts from stdin line by line instead of running one task
    #[arg(long)]
    pub repl: bool,

    /// Disable all MCP servers
    #[arg(long)]
    pub no_mcp: bool,

    /// Explicit MCP config JSON, overriding project and global config
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub mcp_config: Option<PathBuf>,

    /// Overlay sandbox to re-exec under
    #[arg(long, value_enum, value_name = "KIND")]
    pub sandbox: Option<SandboxKind>,

    /// Overlay session ID (default: derived from the project path)
    #[arg(long, value_name = "ID")]
    pub sandbox_session: Option<String>,

    /// Do not derive an overlay session ID automatically
    #[arg(long)]
    pub no_sandbox_auto_session: bool,

    /// Fail reads of files not tracked by the overlay (requires overlay
    /// support)
    #[arg(long)]
    pub sandbox_strict_read: bool,

    /// Model identifier sent to the provider
    #[arg(long, default_value = defaults::MODEL)]
    pub model: String,

    /// Environment variable holding the provider API key
    #[arg(long, default_value = defaults::API_KEY_ENV)]
    pub api_key_env: String,

    /// Provider base URL (an OpenAI-compatible /chat/completions endpoint)
    #[arg(long, default_value = defaults::BASE_URL)]
    pub base_url: String,
}

impl Cli {
    /// The allowlist as a sorted, deduplicated vector.
    pub fn allowed_command_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .allowed_commands
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

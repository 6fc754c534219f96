//! Centralised limits and defaults for the agent runtime.
//!
//! Every cap that shapes what the model sees lives here so the numbers are
//! auditable in one place instead of being scattered through the tool layer.

/// Name of the scratch directory created inside the base directory.
pub const SCRATCH_DIR_NAME: &str = ".swival";

/// Inline cap for a single file read.
pub const FILE_READ_INLINE_CAP: usize = 50 * 1024;
/// Longest line returned by `read_file`; longer lines are clipped.
pub const FILE_READ_LINE_CAP: usize = 2000;

/// Maximum entries returned by `list_dir` and `grep`.
pub const LISTING_ENTRY_CAP: usize = 100;

/// Inline cap for command output before it spills to disk.
pub const COMMAND_INLINE_CAP: usize = 10 * 1024;
/// On-disk cap for spilled command output.
pub const COMMAND_SPILL_CAP: usize = 1024 * 1024;

/// Inline cap for MCP tool results.
pub const MCP_RESULT_INLINE_CAP: usize = 20 * 1024;
/// On-disk cap for spilled MCP results.
pub const MCP_RESULT_SPILL_CAP: usize = 10 * 1024 * 1024;
/// Inline cap for MCP errors. Errors are truncated, never spilled.
pub const MCP_ERROR_INLINE_CAP: usize = 20 * 1024;

/// Inline cap for converted URL fetch output.
pub const FETCH_INLINE_CAP: usize = 50 * 1024;
/// On-disk cap for the raw fetched body.
pub const FETCH_SPILL_CAP: usize = 5 * 1024 * 1024;
/// Maximum redirect hops followed by `fetch_url`.
pub const FETCH_REDIRECT_LIMIT: usize = 10;
/// Overall wall-clock timeout for a single fetch.
pub const FETCH_TIMEOUT_SECS: u64 = 30;
/// `HISTORY.md` stops growing once it reaches this size.
pub const FETCH_HISTORY_CAP: u64 = 500 * 1024;

/// Character cap applied to each instruction file.
pub const INSTRUCTION_FILE_CHAR_CAP: usize = 10_000;

/// Spill files older than this are swept.
pub const SPILL_MAX_AGE_SECS: u64 = 10 * 60;

/// Default wall-clock timeout for `run_command`.
pub const COMMAND_TIMEOUT_SECS: u64 = 60;

/// Per-server MCP connection timeout at startup.
pub const MCP_STARTUP_TIMEOUT_SECS: u64 = 15;
/// Timeout applied to each MCP tool call.
pub const MCP_CALL_TIMEOUT_SECS: u64 = 60;
/// Warn when MCP schemas consume more than this share of the context window.
pub const MCP_SCHEMA_WARN_RATIO: f64 = 0.30;
/// Trim servers until MCP schemas fit within this share of the window.
pub const MCP_SCHEMA_MAX_RATIO: f64 = 0.50;

/// Tokens reserved between the estimated prompt and the window edge.
pub const CONTEXT_SAFETY_MARGIN: usize = 1024;
/// Below this output budget the loop compacts before calling the model.
pub const CONTEXT_SAFETY_FLOOR: usize = 256;

/// Checkpoint summaries are consolidated past this estimated token total.
pub const CHECKPOINT_SUMMARY_TOKEN_CAP: usize = 2000;
/// A proactive checkpoint summary covers this many completed turns.
pub const CHECKPOINT_SUMMARY_INTERVAL: usize = 10;

/// Consecutive read-only turns before the snapshot nudge fires.
pub const READ_STREAK_NUDGE_AT: usize = 5;

/// Turns without a todo interaction before the reminder fires.
pub const TODO_REMINDER_AFTER_TURNS: usize = 3;

/// Static system-prompt preamble; instruction files and knowledge channels
/// are appended to it every turn.
pub const SYSTEM_PREAMBLE: &str = "\
You are swival, a coding agent operating inside a sandboxed workspace.

Work in small verifiable steps. Read files before you modify them; the \
runtime enforces this. Use the provided tools for every filesystem, \
command, and network interaction. Record multi-step reasoning with the \
`think` tool, track outstanding work with `todo`, and collapse finished \
exploration with `snapshot`. When the task is complete, reply with plain \
text and no tool calls: that text is your final answer.";

/// Defaults for the CLI surface.
pub mod defaults {
    pub const MAX_TURNS: usize = 40;
    pub const MAX_OUTPUT_TOKENS: usize = 4096;
    pub const MAX_CONTEXT_TOKENS: usize = 32_768;
    pub const MODEL: &str = "gpt-4.1-mini";
    pub const API_KEY_ENV: &str = "SWIVAL_API_KEY";
    pub const BASE_URL: &str = "https://api.openai.com/v1";
}

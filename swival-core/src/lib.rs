//! swival-core: the agent runtime behind the `swival` binary.
//!
//! The crate is organised around three subsystems:
//!
//! - the **agent loop** ([`core::agent`]): a turn scheduler alternating
//!   between completions and tool dispatch,
//! - the **context manager** ([`core::context_manager`]): token budgeting
//!   and three-level graduated compaction,
//! - the **sandboxed tool layer** ([`tools`]): path-anchored filesystem
//!   tools, whitelist command execution, SSRF-guarded fetches, and MCP
//!   integration ([`mcp`]).
//!
//! Session-scoped state (read tracker, knowledge channels, snapshot
//! controller) is bundled in [`session::SessionContext`] and passed
//! explicitly through the loop.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod instructions;
pub mod knowledge;
pub mod llm;
pub mod mcp;
pub mod report;
pub mod sandbox;
pub mod session;
pub mod snapshot;
pub mod tools;

pub use crate::core::{AgentRunner, RunSummary, RunnerConfig};
pub use crate::error::{ToolError, ToolErrorKind};
pub use crate::report::Outcome;
pub use crate::session::SessionContext;

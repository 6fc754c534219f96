//! Startup helpers for the swival binary.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use swival_core::cli::Cli;
use swival_core::config::constants::{MCP_CALL_TIMEOUT_SECS, MCP_STARTUP_TIMEOUT_SECS};
use swival_core::config::load_mcp_servers;
use swival_core::core::{ContextConfig, ContextManager};
use swival_core::mcp::{McpClientPool, apply_schema_budget};
use swival_core::report::Settings;
use swival_core::tools::{CommandPolicy, SystemResolver, ToolRegistry, register_builtins};
use swival_core::tools::path_policy::PathPolicy;
use swival_core::SessionContext;

/// Diagnostics always go to stderr; stdout is reserved for the answer.
pub fn initialize_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn resolve_base_dir(cli: &Cli) -> Result<PathBuf> {
    let base = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    dunce::canonicalize(&base)
        .with_context(|| format!("base directory {} is not usable", base.display()))
}

pub fn build_session(cli: &Cli, base_dir: &Path) -> Result<Arc<SessionContext>> {
    let paths = PathPolicy::new(base_dir, &cli.add_dirs, &cli.add_dirs_ro, cli.yolo)?;
    Ok(Arc::new(SessionContext::new(
        paths,
        cli.no_read_guard,
        cli.yolo,
    )))
}

pub fn build_context_manager(cli: &Cli) -> ContextManager {
    use swival_core::config::constants::{CONTEXT_SAFETY_FLOOR, CONTEXT_SAFETY_MARGIN};
    ContextManager::new(ContextConfig {
        context_window: cli.max_context_tokens,
        max_output_tokens: cli.max_output_tokens,
        safety_margin: CONTEXT_SAFETY_MARGIN,
        safety_floor: CONTEXT_SAFETY_FLOOR,
    })
}

/// Connect MCP servers, budget their schemas, and register them together
/// with the built-ins into one registry.
pub async fn build_registry(
    cli: &Cli,
    base_dir: &Path,
    context: &ContextManager,
) -> Result<(ToolRegistry, Option<Arc<McpClientPool>>)> {
    let command_policy = Arc::new(CommandPolicy::from_allowlist(
        &cli.allowed_command_list(),
        base_dir,
        cli.yolo,
    )?);

    let mut registry = ToolRegistry::new();
    register_builtins(
        &mut registry,
        command_policy,
        Arc::new(SystemResolver),
        cli.yolo,
    )?;

    if cli.no_mcp {
        return Ok((registry, None));
    }

    let configs = load_mcp_servers(base_dir, cli.mcp_config.as_deref())?;
    if configs.is_empty() {
        return Ok((registry, None));
    }

    let mut pool = McpClientPool::connect_all(
        &configs,
        Duration::from_secs(MCP_STARTUP_TIMEOUT_SECS),
        Duration::from_secs(MCP_CALL_TIMEOUT_SECS),
    )
    .await;

    let outcome = apply_schema_budget(&mut pool, context.context_window(), context.estimator());
    if !outcome.removed_servers.is_empty() {
        warn!(
            removed = ?outcome.removed_servers,
            "MCP servers trimmed to fit the schema budget"
        );
    }

    let pool = Arc::new(pool);
    for name in pool.server_names() {
        if let Some(handle) = pool.server(&name) {
            registry.register_mcp_server(Arc::clone(&pool), &name, handle.tools());
        }
    }
    Ok((registry, Some(pool)))
}

pub fn build_settings(cli: &Cli, instructions: &[(String, String)]) -> Settings {
    Settings {
        temperature: cli.temperature,
        top_p: cli.top_p,
        seed: cli.seed,
        max_turns: cli.max_turns,
        max_output_tokens: cli.max_output_tokens,
        context_length: cli.max_context_tokens,
        yolo: cli.yolo,
        allowed_commands: cli.allowed_command_list(),
        skills_discovered: Vec::new(),
        instructions_loaded: instructions.iter().map(|(name, _)| name.clone()).collect(),
    }
}

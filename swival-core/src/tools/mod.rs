//! The sandboxed tool layer: path policy, read-before-write guard, output
//! caps, the built-in tool set, and the registry that unifies built-ins
//! with MCP-backed tools.

pub mod command;
pub mod fetch;
pub mod file_ops;
pub mod knowledge_tools;
pub mod output_caps;
pub mod path_policy;
pub mod read_tracker;
pub mod registry;
pub mod search;
pub mod traits;

use std::sync::Arc;

pub use command::{CommandPolicy, RunCommandTool};
pub use fetch::{FetchUrlTool, NameResolver, SystemResolver};
pub use file_ops::{EditFileTool, ReadFileTool, WriteFileTool};
pub use knowledge_tools::{SnapshotTool, ThinkTool, TodoTool};
pub use registry::{ToolOrigin, ToolRegistry, ToolSpec};
pub use search::{GrepTool, ListDirTool};
pub use traits::Tool;

/// Register the built-in tool set. `run_command` only exists when the
/// allowlist is non-empty or YOLO is set.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    command_policy: Arc<CommandPolicy>,
    resolver: Arc<dyn NameResolver>,
    yolo: bool,
) -> anyhow::Result<()> {
    registry.register_builtin(Arc::new(ReadFileTool));
    registry.register_builtin(Arc::new(WriteFileTool));
    registry.register_builtin(Arc::new(EditFileTool));
    registry.register_builtin(Arc::new(ListDirTool));
    registry.register_builtin(Arc::new(GrepTool));
    if yolo || !command_policy.is_empty() {
        registry.register_builtin(Arc::new(RunCommandTool::new(command_policy)));
    }
    registry.register_builtin(Arc::new(FetchUrlTool::new(resolver)?));
    registry.register_builtin(Arc::new(ThinkTool));
    registry.register_builtin(Arc::new(TodoTool));
    registry.register_builtin(Arc::new(SnapshotTool));
    Ok(())
}

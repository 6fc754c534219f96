//! MCP client pool: connects configured tool servers at startup, exposes
//! their tools under namespaced names, and tracks per-server degradation.

mod client;
pub mod schema_budget;

pub use client::{McpClientPool, McpServerHandle, McpToolSpec};
pub use schema_budget::{SchemaBudgetOutcome, apply_schema_budget};

/// Namespace an MCP tool as `mcp__<server>__<tool>`.
pub fn qualified_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// Split a qualified name back into `(server, tool)`.
pub fn split_qualified_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("mcp__")?;
    rest.split_once("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_round_trip() {
        let name = qualified_tool_name("context7", "search_docs");
        assert_eq!(name, "mcp__context7__search_docs");
        assert_eq!(split_qualified_name(&name), Some(("context7", "search_docs")));
        assert_eq!(split_qualified_name("read_file"), None);
    }
}

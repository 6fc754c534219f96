//! Tool registry: built-in contracts plus dynamically registered MCP tools.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::token_estimator::TokenEstimator;
use crate::error::ToolError;
use crate::mcp::{McpClientPool, McpToolSpec, qualified_tool_name};
use crate::session::SessionContext;

use super::traits::Tool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOrigin {
    Builtin,
    Mcp { server: String },
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub origin: ToolOrigin,
}

/// The two shapes a registered tool can take. MCP entries hold a
/// back-reference to the client pool instead of a `Tool` impl.
enum ToolBinding {
    Builtin(Arc<dyn Tool>),
    Mcp {
        pool: Arc<McpClientPool>,
        server: String,
        tool: String,
    },
}

pub struct ToolRegistry {
    entries: Vec<(ToolSpec, ToolBinding)>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register_builtin(&mut self, tool: Arc<dyn Tool>) {
        let spec = ToolSpec {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            schema: tool.schema(),
            origin: ToolOrigin::Builtin,
        };
        self.insert(spec, ToolBinding::Builtin(tool));
    }

    /// Merge one connected server's tools under `mcp__<server>__<tool>`.
    pub fn register_mcp_server(
        &mut self,
        pool: Arc<McpClientPool>,
        server: &str,
        tools: &[McpToolSpec],
    ) {
        for tool in tools {
            let spec = ToolSpec {
                name: qualified_tool_name(server, &tool.name),
                description: tool.description.clone(),
                schema: tool.schema.clone(),
                origin: ToolOrigin::Mcp {
                    server: server.to_string(),
                },
            };
            self.insert(
                spec,
                ToolBinding::Mcp {
                    pool: Arc::clone(&pool),
                    server: server.to_string(),
                    tool: tool.name.clone(),
                },
            );
        }
    }

    fn insert(&mut self, spec: ToolSpec, binding: ToolBinding) {
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push((spec, binding));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|(spec, _)| spec)
    }

    /// Function-call payloads advertised to the model.
    pub fn llm_payload(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|(spec, _)| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.schema,
                    }
                })
            })
            .collect()
    }

    /// Estimated token cost of all advertised schemas, charged against the
    /// prompt budget.
    pub fn schema_tokens(&self, estimator: &TokenEstimator) -> usize {
        self.llm_payload()
            .iter()
            .map(|payload| estimator.estimate_schema(payload))
            .sum()
    }

    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        session: &SessionContext,
    ) -> Result<String, ToolError> {
        let Some(&idx) = self.index.get(name) else {
            return Err(ToolError::other(format!("unknown tool '{name}'")));
        };
        match &self.entries[idx].1 {
            ToolBinding::Builtin(tool) => tool.execute(args, session).await,
            ToolBinding::Mcp { pool, server, tool } => {
                match pool.call(server, tool, args).await {
                    Ok(text) => Ok(session.caps.cap_mcp_result(&text)),
                    Err(err) => match err.kind() {
                        // Guarded kinds pass through untouched; plain server
                        // errors get the inline error cap (never spilled).
                        Some(_) => Err(err),
                        None => Err(ToolError::other(
                            session.caps.cap_mcp_error(err.message()),
                        )),
                    },
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

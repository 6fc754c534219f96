//! MCP server configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One configured MCP server. The transport is inferred from which fields
/// are present: `command` means stdio, `url` means streamable HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Server names become the middle segment of `mcp__<server>__<tool>`, so a
/// name containing `__` would make tool names ambiguous.
pub fn validate_server_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("MCP server name must not be empty".to_string());
    }
    if name.contains("__") {
        return Err(format!(
            "MCP server name '{name}' must not contain '__'"
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "MCP server name '{name}' must match [A-Za-z0-9_-]+"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_server_name("context7").is_ok());
        assert!(validate_server_name("my-server_2").is_ok());
        assert!(validate_server_name("").is_err());
        assert!(validate_server_name("bad__name").is_err());
        assert!(validate_server_name("spaced name").is_err());
    }

    #[test]
    fn transport_is_inferred_from_fields() {
        let stdio: McpServerConfig =
            serde_json::from_str(r#"{"command":"npx","args":["-y","server"]}"#).unwrap();
        assert!(matches!(stdio.transport, McpTransportConfig::Stdio { .. }));

        let http: McpServerConfig =
            serde_json::from_str(r#"{"url":"https://example.com/mcp"}"#).unwrap();
        assert!(matches!(http.transport, McpTransportConfig::Http { .. }));
    }
}

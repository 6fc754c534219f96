//! Layered MCP server configuration.
//!
//! Precedence, high to low: explicit `--mcp-config` JSON file, project
//! `swival.toml` (`[mcp_servers.<name>]` tables), project `.mcp.json`
//! (`mcpServers` object), global `~/.config/swival/mcp.json`. A server
//! defined in a higher layer completely shadows the same name below it.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::mcp::{McpServerConfig, validate_server_name};

const PROJECT_TOML: &str = "swival.toml";
const PROJECT_JSON: &str = ".mcp.json";

#[derive(Debug, Default, Deserialize)]
struct JsonConfigFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: HashMap<String, McpServerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlConfigFile {
    #[serde(default)]
    mcp_servers: HashMap<String, McpServerConfig>,
}

/// Load and merge MCP server configs for the given project directory.
pub fn load_mcp_servers(
    base_dir: &Path,
    override_file: Option<&Path>,
) -> Result<Vec<McpServerConfig>> {
    // Lowest layer first; later inserts overwrite.
    let mut merged: HashMap<String, McpServerConfig> = HashMap::new();

    if let Some(global) = global_config_path() {
        if global.exists() {
            merge_layer(&mut merged, load_json_layer(&global)?, "global");
        }
    }

    let project_json = base_dir.join(PROJECT_JSON);
    if project_json.exists() {
        merge_layer(&mut merged, load_json_layer(&project_json)?, "project json");
    }

    let project_toml = base_dir.join(PROJECT_TOML);
    if project_toml.exists() {
        merge_layer(&mut merged, load_toml_layer(&project_toml)?, "project toml");
    }

    if let Some(path) = override_file {
        if !path.exists() {
            bail!("--mcp-config file {} does not exist", path.display());
        }
        merge_layer(&mut merged, load_json_layer(path)?, "override");
    }

    for name in merged.keys() {
        if let Err(message) = validate_server_name(name) {
            bail!("invalid MCP configuration: {message}");
        }
    }

    let mut servers: Vec<McpServerConfig> = merged.into_values().collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(servers)
}

fn merge_layer(
    merged: &mut HashMap<String, McpServerConfig>,
    layer: HashMap<String, McpServerConfig>,
    source: &str,
) {
    for (name, mut config) in layer {
        debug!(server = name.as_str(), source, "MCP server configured");
        config.name = name.clone();
        merged.insert(name, config);
    }
}

fn load_json_layer(path: &Path) -> Result<HashMap<String, McpServerConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: JsonConfigFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed.mcp_servers)
}

fn load_toml_layer(path: &Path) -> Result<HashMap<String, McpServerConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: TomlConfigFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed.mcp_servers)
}

fn global_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("swival").join("mcp.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn project_toml_shadows_project_json() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_JSON),
            r#"{"mcpServers": {"files": {"command": "old-server"}, "web": {"url": "https://example.com/mcp"}}}"#,
        )
        .unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_TOML),
            "[mcp_servers.files]\ncommand = \"new-server\"\nargs = [\"--stdio\"]\n",
        )
        .unwrap();

        let servers = load_mcp_servers(tmp.path(), None).unwrap();
        assert_eq!(servers.len(), 2);
        let files = servers.iter().find(|s| s.name == "files").unwrap();
        match &files.transport {
            crate::config::mcp::McpTransportConfig::Stdio { command, .. } => {
                assert_eq!(command, "new-server");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn override_file_wins_over_everything() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_TOML),
            "[mcp_servers.files]\ncommand = \"project\"\n",
        )
        .unwrap();
        let override_path = tmp.path().join("override.json");
        std::fs::write(
            &override_path,
            r#"{"mcpServers": {"files": {"command": "override"}}}"#,
        )
        .unwrap();

        let servers = load_mcp_servers(tmp.path(), Some(&override_path)).unwrap();
        match &servers[0].transport {
            crate::config::mcp::McpTransportConfig::Stdio { command, .. } => {
                assert_eq!(command, "override");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn invalid_server_name_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_JSON),
            r#"{"mcpServers": {"bad__name": {"command": "x"}}}"#,
        )
        .unwrap();
        assert!(load_mcp_servers(tmp.path(), None).is_err());
    }

    #[test]
    fn missing_override_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.json");
        assert!(load_mcp_servers(tmp.path(), Some(&missing)).is_err());
    }
}

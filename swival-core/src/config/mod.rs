//! Runtime configuration: centralised constants, MCP server config types,
//! and the layered config loader.

pub mod constants;
pub mod loader;
pub mod mcp;

pub use loader::load_mcp_servers;
pub use mcp::{McpServerConfig, McpTransportConfig, validate_server_name};

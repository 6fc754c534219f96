//! The tool capability seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ToolError, ToolErrorKind};
use crate::session::SessionContext;

/// A built-in tool: a JSON schema plus an invocation that yields text.
/// MCP-backed tools satisfy the same contract through the registry's MCP
/// binding instead of this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn schema(&self) -> Value;

    async fn execute(&self, args: Value, session: &SessionContext)
        -> Result<String, ToolError>;
}

/// Deserialize an arguments object, mapping failures to the typed
/// invalid-arguments error the report expects.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| {
        ToolError::new(
            ToolErrorKind::InvalidToolArguments,
            format!("invalid arguments: {err}"),
        )
    })
}

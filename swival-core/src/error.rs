//! Tool-level errors carried back into the model's view.
//!
//! Tool failures are values, not exceptions: the dispatch pipeline converts a
//! [`ToolError`] into a tool-result message with `succeeded=false` so the
//! model can adjust its approach. Only startup configuration problems are
//! allowed to abort the process.

/// Machine-readable categories for guarded tool failures.
///
/// The report timeline and the end-to-end tests key off these names, so the
/// `code()` strings are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    PathEscape,
    RootForbidden,
    ReadOnlyViolation,
    UnreadTarget,
    CommandNotAllowed,
    SchemeNotAllowed,
    PrivateAddress,
    RedirectLimit,
    BinaryContent,
    InvalidToolArguments,
    McpDegraded,
    McpTimeout,
}

impl ToolErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathEscape => "PathEscape",
            Self::RootForbidden => "RootForbidden",
            Self::ReadOnlyViolation => "ReadOnlyViolation",
            Self::UnreadTarget => "UnreadTarget",
            Self::CommandNotAllowed => "CommandNotAllowed",
            Self::SchemeNotAllowed => "SchemeNotAllowed",
            Self::PrivateAddress => "PrivateAddress",
            Self::RedirectLimit => "RedirectLimit",
            Self::BinaryContent => "BinaryContent",
            Self::InvalidToolArguments => "InvalidToolArguments",
            Self::McpDegraded => "McpDegraded",
            Self::McpTimeout => "McpTimeout",
        }
    }
}

/// A failed tool invocation.
///
/// `kind` is present for guardrail-relevant failures; plain operational
/// errors (file not found, regex syntax, subprocess exit) carry only text.
#[derive(Debug)]
pub struct ToolError {
    kind: Option<ToolErrorKind>,
    message: String,
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}: {}", kind.code(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ToolError {}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ToolErrorKind> {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Short identifier recorded in the report timeline: the kind code when
    /// present, otherwise the message itself.
    pub fn report_label(&self) -> String {
        match self.kind {
            Some(kind) => kind.code().to_string(),
            None => self.message.clone(),
        }
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        ToolError::other(format!("{err:#}"))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinded_error_renders_code_prefix() {
        let err = ToolError::new(ToolErrorKind::UnreadTarget, "src/x.txt was never read");
        assert_eq!(err.to_string(), "UnreadTarget: src/x.txt was never read");
        assert_eq!(err.report_label(), "UnreadTarget");
    }

    #[test]
    fn plain_error_has_no_code() {
        let err = ToolError::other("no such file");
        assert_eq!(err.to_string(), "no such file");
        assert_eq!(err.report_label(), "no such file");
    }
}

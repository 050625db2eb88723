//! Error types for the MCP bridge.

use thiserror::Error;

use crate::mcp::protocol::error_codes;

/// Result type alias for MCP bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the MCP bridge.
///
/// Tool-level failures are not represented here: a tool that fails reports
/// `ToolResult { is_error: true }` inside a successful exchange.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Transport / Process Errors =====
    #[error("Failed to start peer process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Peer process exited unexpectedly: {0}")]
    ProcessExit(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    // ===== RPC Errors =====
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    // ===== Caller-local Outcomes =====
    #[error("Cancelled: call was cancelled")]
    Cancelled,

    #[error("Timeout: call timed out after {millis} ms")]
    Timeout { millis: u64 },

    // ===== MCP Errors =====
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Connection not initialized: call initialize() first")]
    NotInitialized,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Duplicate parameter '{param}' in tool '{tool}'")]
    DuplicateParameter { tool: String, param: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already registered: {0}")]
    DuplicateResource(String),

    // ===== Argument Errors =====
    #[error("missing required field {0}")]
    MissingField(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an RPC error from a peer-supplied code and message.
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Failures that make the connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. }
                | Self::Transport(_)
                | Self::ProcessExit(_)
                | Self::ConnectionClosed(_)
                | Self::InvalidFrame(_)
                | Self::Io(_)
        )
    }

    /// An error response returned by the peer for one call.
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// The caller gave up on the call (explicit cancel or deadline).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }

    /// JSON-RPC error code used when this error is reported to a peer.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::InvalidToolArguments(_) | Self::MissingField(_) => {
                error_codes::INVALID_PARAMS
            }
            Self::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            Self::InvalidFrame(_) => error_codes::PARSE_ERROR,
            _ => error_codes::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let rpc_err = Error::rpc(-32601, "Method not found");
        assert_eq!(rpc_err.to_string(), "RPC error -32601: Method not found");

        let missing = Error::MissingField("query".to_string());
        assert_eq!(missing.to_string(), "missing required field query");

        let closed = Error::ConnectionClosed("peer exited".to_string());
        assert_eq!(closed.to_string(), "Connection closed: peer exited");
    }

    #[test]
    fn test_error_classes_are_disjoint() {
        let transport = Error::ConnectionClosed("eof".to_string());
        let rpc = Error::rpc(-32603, "boom");
        let cancelled = Error::Cancelled;
        let timeout = Error::Timeout { millis: 250 };

        assert!(transport.is_transport());
        assert!(!transport.is_rpc());
        assert!(!transport.is_cancellation());

        assert!(rpc.is_rpc());
        assert!(!rpc.is_transport());
        assert!(!rpc.is_cancellation());

        assert!(cancelled.is_cancellation());
        assert!(timeout.is_cancellation());
        assert!(!cancelled.is_transport());
        assert!(!timeout.is_rpc());
    }

    #[test]
    fn test_spawn_error_is_transport() {
        let err = Error::Spawn {
            command: "does-not-exist".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.is_transport());
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_rpc_codes() {
        assert_eq!(
            Error::MethodNotFound("x".to_string()).rpc_code(),
            error_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            Error::InvalidParams("x".to_string()).rpc_code(),
            error_codes::INVALID_PARAMS
        );
        assert_eq!(
            Error::ResourceNotFound("x".to_string()).rpc_code(),
            error_codes::RESOURCE_NOT_FOUND
        );
        assert_eq!(Error::rpc(42, "custom").rpc_code(), 42);
        assert_eq!(
            Error::Internal("x".to_string()).rpc_code(),
            error_codes::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_timeout_and_cancelled() {
        let timeout = Error::Timeout { millis: 1500 };
        assert_eq!(timeout.to_string(), "Timeout: call timed out after 1500 ms");

        let cancelled = Error::Cancelled;
        assert_eq!(cancelled.to_string(), "Cancelled: call was cancelled");
    }
}

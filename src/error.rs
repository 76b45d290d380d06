//! Error types for the broker.
//!
//! Errors are split by origin: transport failures carry a nested
//! [`TransportError`], JSON-RPC `error` fields surface as [`Error::Rpc`],
//! and the manager's gate decisions map to dedicated variants so callers
//! can discriminate policy refusals from execution failures.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC error codes honored by the broker.
pub mod code {
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Generic server error (including "not initialized").
    pub const SERVER_ERROR: i64 = -32000;
}

/// Top-level broker error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure (spawn, socket, framing, closed pipe).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A JSON-RPC `error` field returned by a server.
    #[error("mcp error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message from the server.
        message: String,
    },

    /// Malformed or unexpected protocol traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential resolution failure.
    #[error("credential error: {0}")]
    Credential(String),

    /// The server half of a namespaced tool name is not configured.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// A tool name that does not split into `<server>:<tool>`.
    #[error("invalid tool name: {0}")]
    InvalidToolName(String),

    /// The policy engine refused the call.
    #[error("denied by policy: {0}")]
    PolicyDenied(String),

    /// The policy engine returned a decision the broker does not know.
    #[error("unknown policy decision: {0}")]
    UnknownDecision(String),

    /// A human (or the approval delegate) rejected the call.
    #[error("denied by user")]
    ApprovalDenied,

    /// No approval arrived before the deadline.
    #[error("approval timed out")]
    ApprovalTimeout,

    /// The pending approval was discarded, e.g. on broker shutdown.
    #[error("approval cancelled")]
    ApprovalCancelled,

    /// A bounded operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Whether this error originated from a policy or approval gate, i.e.
    /// the transport was never invoked.
    pub fn is_gate_refusal(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenied(_)
                | Self::UnknownDecision(_)
                | Self::ApprovalDenied
                | Self::ApprovalTimeout
                | Self::ApprovalCancelled
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid JSON: {err}"))
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport is closed; outstanding and future calls fail.
    #[error("transport closed")]
    Closed,

    /// Child process could not be spawned.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// I/O failure on a pipe or socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame that could not be encoded or decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A request that failed before producing a response.
    #[error("request failed: {0}")]
    Request(String),

    /// Non-2xx HTTP status; the body is trimmed to serve as the message.
    #[error("http status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Trimmed response body.
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display() {
        let err = Error::Rpc {
            code: -32601,
            message: "method not found".to_string(),
        };
        assert_eq!(err.to_string(), "mcp error -32601: method not found");
    }

    #[test]
    fn transport_error_wraps_into_error() {
        let err: Error = TransportError::Closed.into();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
        assert_eq!(err.to_string(), "transport closed");
    }

    #[test]
    fn gate_refusals_are_flagged() {
        assert!(Error::PolicyDenied("no".into()).is_gate_refusal());
        assert!(Error::ApprovalTimeout.is_gate_refusal());
        assert!(!Error::Protocol("bad".into()).is_gate_refusal());
    }
}

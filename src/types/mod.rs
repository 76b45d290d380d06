//! Wire types for the JSON-RPC 2.0 dialect spoken with tool servers.
//!
//! Every on-wire frame is a request, a notification, or a response. A
//! request id is a non-empty string or an integer; string and integer ids
//! occupy distinct key spaces, and [`RequestId::key`] renders the
//! canonical dispatch-table key all transports share.

pub mod capabilities;
pub mod protocol;

pub use capabilities::{ClientCapabilities, ServerCapabilities, ToolCapabilities};
pub use protocol::{
    CallToolRequest, CallToolResult, Content, Implementation, InitializeRequest, InitializeResult,
    ListToolsRequest, ListToolsResult, ProtocolVersion, ToolInfo,
};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request id.
///
/// String `"1"` and integer `1` are distinct ids and never alias; the enum
/// discriminant carries the key space, and [`RequestId::key`] makes the
/// separation explicit for correlation maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String id.
    String(String),
    /// Numeric id.
    Number(i64),
}

impl RequestId {
    /// Canonical dispatch-table key: `s:<value>` for strings, `n:<value>`
    /// for numbers. All transports key their reply maps by this form.
    pub fn key(&self) -> String {
        match self {
            Self::String(s) => format!("s:{s}"),
            Self::Number(n) => format!("n:{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A JSON-RPC request. Always carries an id; use
/// [`JSONRPCNotification`] for fire-and-forget traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id, unique across the owning transport.
    pub id: RequestId,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters; omitted entirely when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JSONRPCRequest {
    /// Create a request frame.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification: a request without an id. Elicits no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name, e.g. `notifications/initialized`.
    pub method: String,
    /// Method parameters; omitted entirely when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JSONRPCNotification {
    /// Create a notification frame.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response carrying exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request this response answers.
    pub id: RequestId,
    /// Success or error payload.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// The mutually exclusive payload of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Successful result.
    Result {
        /// Result value, method-specific.
        result: Value,
    },
    /// Error outcome.
    Error {
        /// Error object.
        error: JSONRPCError,
    },
}

impl JSONRPCResponse {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result { result },
        }
    }

    /// Create an error response.
    pub fn error(id: RequestId, error: JSONRPCError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error { error },
        }
    }

    /// The result value, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result { result } => Some(result),
            ResponsePayload::Error { .. } => None,
        }
    }

    /// The error object, if this is an error response.
    pub fn rpc_error(&self) -> Option<&JSONRPCError> {
        match &self.payload {
            ResponsePayload::Error { error } => Some(error),
            ResponsePayload::Result { .. } => None,
        }
    }

    /// Unwrap into the result value, mapping an error payload to
    /// [`Error::Rpc`].
    pub fn into_result(self) -> Result<Value> {
        match self.payload {
            ResponsePayload::Result { result } => Ok(result),
            ResponsePayload::Error { error } => Err(Error::Rpc {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JSONRPCError {
    /// Create an error object without detail data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32601 method not found`.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            crate::error::code::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }

    /// `-32602 invalid params`.
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(crate::error::code::INVALID_PARAMS, detail)
    }

    /// `-32000 server error`.
    pub fn server_error(detail: impl Into<String>) -> Self {
        Self::new(crate::error::code::SERVER_ERROR, detail)
    }
}

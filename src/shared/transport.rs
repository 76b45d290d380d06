//! The client-side transport contract.

use crate::error::Result;
use crate::types::{JSONRPCNotification, JSONRPCRequest, JSONRPCResponse};
use async_trait::async_trait;

/// A transport that carries JSON-RPC traffic to a single tool server.
///
/// Implementations correlate each request with its response by id, so
/// callers may issue concurrent requests over one transport. Dropping a
/// `call` future deregisters its reply slot.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a request and wait for the correlated response.
    async fn call(&self, request: JSONRPCRequest) -> Result<JSONRPCResponse>;

    /// Send a notification. No reply is expected.
    async fn notify(&self, notification: JSONRPCNotification) -> Result<()>;

    /// Release transport resources. Idempotent; outstanding calls fail
    /// with "transport closed".
    async fn close(&self) -> Result<()>;

    /// Short transport label for logs.
    fn transport_type(&self) -> &'static str;
}

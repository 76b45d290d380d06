//! Per-server client session.
//!
//! A [`ClientSession`] wraps one transport and provides the three
//! operations the broker needs: the lazy initialize handshake, paginated
//! tool listing, and tool invocation. The handshake runs automatically
//! before the first operation and is bounded by a 5 second timeout; a
//! failed handshake leaves the session uninitialized so the next
//! operation retries.

use crate::error::{Error, Result};
use crate::shared::Transport;
use crate::types::capabilities::ClientCapabilities;
use crate::types::protocol::{
    CallToolRequest, CallToolResult, Implementation, InitializeRequest, InitializeResult,
    ListToolsRequest, ListToolsResult, ToolInfo,
};
use crate::types::{JSONRPCNotification, JSONRPCRequest, RequestId, ResponsePayload};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Bound on the initialize handshake.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Negotiated handshake state.
#[derive(Debug, Clone)]
struct Handshake {
    protocol_version: String,
    capabilities: Value,
}

/// A client session bound to a single tool server.
#[derive(Debug)]
pub struct ClientSession {
    /// Server name, used for logging only.
    name: String,
    transport: Arc<dyn Transport>,
    /// Version requested in the handshake.
    requested_version: String,
    client_info: Implementation,
    next_id: AtomicI64,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    handshake: parking_lot::Mutex<Option<Handshake>>,
}

impl ClientSession {
    /// Create a session over `transport`. `protocol_version` overrides the
    /// crate default requested during the handshake.
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        protocol_version: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            requested_version: protocol_version
                .unwrap_or_else(|| crate::DEFAULT_PROTOCOL_VERSION.to_string()),
            client_info: Implementation::new(crate::CLIENT_NAME, crate::CLIENT_VERSION),
            next_id: AtomicI64::new(1),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            handshake: parking_lot::Mutex::new(None),
        }
    }

    /// Server name this session is scoped to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Negotiated protocol version, once initialized.
    pub fn protocol_version(&self) -> Option<String> {
        self.handshake
            .lock()
            .as_ref()
            .map(|h| h.protocol_version.clone())
    }

    /// Server capabilities captured at the handshake, once initialized.
    pub fn server_capabilities(&self) -> Option<Value> {
        self.handshake.lock().as_ref().map(|h| h.capabilities.clone())
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Run the initialize handshake if it has not completed yet. The init
    /// lock serializes concurrent first operations so exactly one
    /// handshake is in flight.
    pub async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let params = InitializeRequest {
            protocol_version: self.requested_version.clone(),
            capabilities: ClientCapabilities::tools_only(),
            client_info: self.client_info.clone(),
        };
        let request = JSONRPCRequest::new(
            self.next_request_id(),
            "initialize",
            Some(serde_json::to_value(params)?),
        );

        let response = tokio::time::timeout(INITIALIZE_TIMEOUT, self.transport.call(request))
            .await
            .map_err(|_| Error::Timeout("initialize handshake".to_string()))??;
        let value = response.into_result()?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|err| Error::Protocol(format!("invalid initialize result: {err}")))?;

        debug!(
            server = %self.name,
            version = %result.protocol_version,
            "initialize handshake complete"
        );
        *self.handshake.lock() = Some(Handshake {
            protocol_version: result.protocol_version.0,
            capabilities: result.capabilities,
        });

        self.transport
            .notify(JSONRPCNotification::new("notifications/initialized", None))
            .await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// List all tools, following pagination until `nextCursor` runs out.
    /// Page order is preserved as returned by the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.ensure_initialized().await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = ListToolsRequest {
                cursor: cursor.clone(),
            };
            let request = JSONRPCRequest::new(
                self.next_request_id(),
                "tools/list",
                Some(serde_json::to_value(params)?),
            );
            let value = self.transport.call(request).await?.into_result()?;
            let page: ListToolsResult = serde_json::from_value(value)
                .map_err(|err| Error::Protocol(format!("invalid tools/list result: {err}")))?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Call a tool by bare name. Empty arguments are transmitted as `{}`.
    ///
    /// A result with `is_error = true` is returned as `Ok`: it is a
    /// tool-level failure the caller discriminates from the protocol-level
    /// errors this method returns as `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.ensure_initialized().await?;

        let arguments = match arguments {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        let params = CallToolRequest {
            name: name.to_string(),
            arguments,
        };
        let request = JSONRPCRequest::new(
            self.next_request_id(),
            "tools/call",
            Some(serde_json::to_value(params)?),
        );

        let response = self.transport.call(request).await?;
        match response.payload {
            ResponsePayload::Error { error } => Err(Error::Rpc {
                code: error.code,
                message: error.message,
            }),
            ResponsePayload::Result { result } => {
                if result.is_null() {
                    return Err(Error::Protocol("empty result".to_string()));
                }
                serde_json::from_value(result)
                    .map_err(|err| Error::Protocol(format!("invalid tools/call result: {err}")))
            },
        }
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

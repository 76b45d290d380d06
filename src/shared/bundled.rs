//! In-process transport over a bundled [`ToolProvider`].
//!
//! Speaks the same request/notification contract as the remote transports
//! but dispatches directly to a provider living in the broker's process.
//! The initialize handshake is synthesized; `tools/call` is rejected with
//! `-32000 "not initialized"` until a `notifications/initialized`
//! notification flips the barrier.

use crate::bundled::ToolProvider;
use crate::error::Result;
use crate::shared::transport::Transport;
use crate::types::protocol::{InitializeResult, ListToolsResult, ProtocolVersion};
use crate::types::{
    CallToolRequest, JSONRPCError, JSONRPCNotification, JSONRPCRequest, JSONRPCResponse,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Transport dispatching to an in-process tool provider.
#[derive(Debug)]
pub struct BundledTransport {
    provider: Arc<dyn ToolProvider>,
    initialized: AtomicBool,
}

impl BundledTransport {
    /// Create a transport over `provider`.
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            initialized: AtomicBool::new(false),
        }
    }

    async fn dispatch(&self, request: JSONRPCRequest) -> Result<JSONRPCResponse> {
        let JSONRPCRequest {
            id, method, params, ..
        } = request;
        match method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: ProtocolVersion::default(),
                    capabilities: json!({"tools": {}}),
                    server_info: self.provider.server_info(),
                    instructions: None,
                };
                Ok(JSONRPCResponse::success(id, serde_json::to_value(result)?))
            },
            "tools/list" => match self.provider.list_tools().await {
                Ok(tools) => {
                    let result = ListToolsResult {
                        tools,
                        next_cursor: None,
                    };
                    Ok(JSONRPCResponse::success(id, serde_json::to_value(result)?))
                },
                Err(err) => Ok(JSONRPCResponse::error(
                    id,
                    JSONRPCError::server_error(err.to_string()),
                )),
            },
            "tools/call" => {
                if !self.initialized.load(Ordering::Acquire) {
                    return Ok(JSONRPCResponse::error(
                        id,
                        JSONRPCError::server_error("not initialized"),
                    ));
                }
                let params: CallToolRequest =
                    match serde_json::from_value(params.unwrap_or(json!({}))) {
                        Ok(params) => params,
                        Err(err) => {
                            return Ok(JSONRPCResponse::error(
                                id,
                                JSONRPCError::invalid_params(format!("invalid params: {err}")),
                            ))
                        },
                    };
                match self
                    .provider
                    .call_tool(&params.name, params.arguments)
                    .await
                {
                    Ok(result) => {
                        Ok(JSONRPCResponse::success(id, serde_json::to_value(result)?))
                    },
                    Err(err) => Ok(JSONRPCResponse::error(
                        id,
                        JSONRPCError::server_error(err.to_string()),
                    )),
                }
            },
            other => Ok(JSONRPCResponse::error(
                id,
                JSONRPCError::method_not_found(other),
            )),
        }
    }
}

#[async_trait]
impl Transport for BundledTransport {
    async fn call(&self, request: JSONRPCRequest) -> Result<JSONRPCResponse> {
        self.dispatch(request).await
    }

    async fn notify(&self, notification: JSONRPCNotification) -> Result<()> {
        if notification.method == "notifications/initialized" {
            self.initialized.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "bundled"
    }
}

//! Tool-call broker for MCP tool servers.
//!
//! This crate mediates between an AI runtime and a fleet of tool servers
//! speaking a JSON-RPC 2.0 dialect modeled on the Model Context Protocol.
//! For each configured server it maintains a client session, discovers the
//! tools the server exposes, and dispatches tool invocations through one of
//! three transports:
//!
//! - **bundled**: in-process dispatch to a local [`ToolProvider`],
//! - **stdio**: a supervised child process with newline-delimited JSON-RPC,
//! - **http**: one-shot HTTP POST with JSON or SSE-framed responses.
//!
//! The [`Manager`] is the public surface: it loads server configuration,
//! routes namespaced tool names (`server:tool`), gates every call through a
//! [`PolicyEngine`], parks calls awaiting human approval, caches tool
//! listings, and publishes lifecycle events to an [`EventBus`].
//!
//! # Example
//!
//! ```rust,no_run
//! use pryx_broker::{Manager, broker::events::BroadcastBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> pryx_broker::Result<()> {
//! let bus = Arc::new(BroadcastBus::new(256));
//! let manager = Manager::builder().events(bus.clone()).build();
//!
//! manager.load_and_connect().await?;
//! let tools = manager.list_tools_flat(false).await?;
//! for tool in &tools {
//!     println!("{}", tool.name);
//! }
//!
//! let result = manager
//!     .call_tool("sess-1", "filesystem:read_file", serde_json::json!({"path": "README.md"}))
//!     .await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod bundled;
pub mod client;
pub mod error;
pub mod shared;
pub mod types;

pub use broker::{Manager, ManagerBuilder};
pub use bundled::{BundledRegistry, ToolProvider};
pub use client::ClientSession;
pub use error::{Error, Result, TransportError};
pub use shared::{BundledTransport, HttpTransport, StdioTransport, Transport};
pub use types::{CallToolResult, Content, RequestId, ToolInfo};

/// Protocol version requested during the initialize handshake when the
/// server configuration does not pin one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Client implementation name advertised in `clientInfo`.
pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");

/// Client implementation version advertised in `clientInfo`.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

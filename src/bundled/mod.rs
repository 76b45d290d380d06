//! Bundled tool providers and their registry.
//!
//! A bundled provider runs inside the broker's process and is reached
//! through [`BundledTransport`](crate::shared::BundledTransport) instead of
//! a subprocess or the network. New providers can be registered without
//! changing the broker.

pub mod filesystem;
pub mod shell;

pub use filesystem::FilesystemProvider;
pub use shell::ShellProvider;

use crate::error::{Error, Result};
use crate::types::protocol::Implementation;
use crate::types::{CallToolResult, ToolInfo};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Contract an in-process tool provider must satisfy.
///
/// Returning `Err` from `call_tool` is a protocol-level failure; returning
/// a [`CallToolResult`] with `is_error = true` is a tool-level failure the
/// caller can inspect. Read-only operations must be safe to call from
/// multiple tasks; providers that mutate state serialize internally.
#[async_trait]
pub trait ToolProvider: Send + Sync + std::fmt::Debug {
    /// Implementation info used by the bundled transport's synthesized
    /// `initialize` response.
    fn server_info(&self) -> Implementation;

    /// The tools this provider exposes.
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    /// Invoke a tool by bare name.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;
}

/// Registry resolving bundled provider names to instances.
///
/// Names are trimmed and lowercased before lookup; a small alias table
/// maps `fs` to `filesystem` and `sh` to `shell`.
#[derive(Debug, Default)]
pub struct BundledRegistry {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl BundledRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("filesystem", Arc::new(FilesystemProvider::new()));
        registry.register("shell", Arc::new(ShellProvider::new()));
        registry
    }

    /// Register a provider under `name`.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Resolve a provider by (lowercased, trimmed, alias-expanded) name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolProvider>> {
        let normalized = name.trim().to_ascii_lowercase();
        let canonical = match normalized.as_str() {
            "fs" => "filesystem",
            "sh" => "shell",
            other => other,
        };
        self.providers
            .get(canonical)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no bundled provider named '{name}'")))
    }

    /// Registered provider names, sorted for deterministic seeding.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the registry has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

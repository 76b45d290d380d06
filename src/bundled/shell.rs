//! Bundled shell provider.
//!
//! Exposes a single `run` tool executing a command line through `sh -c`
//! with a bounded execution time. A non-zero exit status is a tool-level
//! failure carrying the combined output; only spawn breakage is a
//! protocol-level error.

use crate::bundled::ToolProvider;
use crate::error::Result;
use crate::types::protocol::Implementation;
use crate::types::{CallToolResult, ToolInfo};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default bound on a single command execution.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process shell execution tools.
#[derive(Debug)]
pub struct ShellProvider {
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RunArgs {
    command: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

impl Default for ShellProvider {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl ShellProvider {
    /// Provider with the default execution timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with a custom execution timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: RunArgs) -> CallToolResult {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&args.command).kill_on_drop(true);
        if let Some(cwd) = &args.cwd {
            cmd.current_dir(cwd);
        }

        debug!(command = %args.command, "running shell tool");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return CallToolResult::error_text(format!("failed to run command: {err}"));
            },
            Err(_) => {
                return CallToolResult::error_text(format!(
                    "command timed out after {:?}",
                    self.timeout
                ));
            },
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(stderr.trim_end());
        }

        CallToolResult {
            content: vec![crate::types::Content::Text { text }],
            is_error: !output.status.success(),
            structured_content: Some(json!({ "exit_code": output.status.code() })),
        }
    }
}

#[async_trait]
impl ToolProvider for ShellProvider {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: "shell".to_string(),
            title: Some("Shell".to_string()),
            version: crate::CLIENT_VERSION.to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(vec![ToolInfo::new(
            "run",
            Some("Run a command line through `sh -c` and capture its output".to_string()),
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "cwd": { "type": "string" }
                },
                "required": ["command"]
            }),
        )])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        match name {
            "run" => match serde_json::from_value(arguments) {
                Ok(args) => Ok(self.run(args).await),
                Err(err) => Ok(CallToolResult::error_text(format!("invalid arguments: {err}"))),
            },
            other => Err(crate::error::Error::Protocol(format!(
                "unknown tool: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let provider = ShellProvider::new();
        let result = provider
            .call_tool("run", json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("hello\n"));
        assert_eq!(result.structured_content.unwrap()["exit_code"], json!(0));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_tool_level_error() {
        let provider = ShellProvider::new();
        let result = provider
            .call_tool("run", json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.structured_content.unwrap()["exit_code"], json!(3));
    }

    #[tokio::test]
    async fn timeout_is_a_tool_level_error() {
        let provider = ShellProvider::with_timeout(Duration::from_millis(50));
        let result = provider
            .call_tool("run", json!({"command": "sleep 5"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("timed out"));
    }
}

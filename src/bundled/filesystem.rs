//! Bundled filesystem provider.
//!
//! Exposes `read_file`, `write_file`, and `list_dir`. Operational failures
//! (missing file, permission denied) are reported as tool-level errors so
//! the caller can distinguish them from protocol breakage.

use crate::bundled::ToolProvider;
use crate::error::Result;
use crate::types::protocol::Implementation;
use crate::types::{CallToolResult, ToolInfo};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// In-process filesystem tools.
#[derive(Debug, Default)]
pub struct FilesystemProvider {
    /// Optional root every path is resolved under.
    root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

impl FilesystemProvider {
    /// Provider resolving paths as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider resolving relative paths under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }

    async fn read_file(&self, args: PathArgs) -> CallToolResult {
        let path = self.resolve(&args.path);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => CallToolResult::text(content),
            Err(err) => CallToolResult::error_text(format!("{}: {err}", path.display())),
        }
    }

    async fn write_file(&self, args: WriteArgs) -> CallToolResult {
        let path = self.resolve(&args.path);
        match tokio::fs::write(&path, args.content.as_bytes()).await {
            Ok(()) => CallToolResult::text(format!(
                "wrote {} bytes to {}",
                args.content.len(),
                path.display()
            )),
            Err(err) => CallToolResult::error_text(format!("{}: {err}", path.display())),
        }
    }

    async fn list_dir(&self, args: PathArgs) -> CallToolResult {
        let path = self.resolve(&args.path);
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(err) => {
                return CallToolResult::error_text(format!("{}: {err}", path.display()));
            },
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(err) => {
                    return CallToolResult::error_text(format!("{}: {err}", path.display()));
                },
            }
        }
        names.sort();
        CallToolResult {
            content: vec![crate::types::Content::Text {
                text: names.join("\n"),
            }],
            is_error: false,
            structured_content: Some(json!({ "entries": names })),
        }
    }
}

#[async_trait]
impl ToolProvider for FilesystemProvider {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: "filesystem".to_string(),
            title: Some("Filesystem".to_string()),
            version: crate::CLIENT_VERSION.to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let path_schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        });
        Ok(vec![
            ToolInfo::new(
                "read_file",
                Some("Read a UTF-8 file and return its contents".to_string()),
                path_schema.clone(),
            ),
            ToolInfo::new(
                "write_file",
                Some("Write a UTF-8 file, replacing any existing contents".to_string()),
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolInfo::new(
                "list_dir",
                Some("List directory entries, sorted by name".to_string()),
                path_schema,
            ),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        match name {
            "read_file" => match serde_json::from_value(arguments) {
                Ok(args) => Ok(self.read_file(args).await),
                Err(err) => Ok(CallToolResult::error_text(format!("invalid arguments: {err}"))),
            },
            "write_file" => match serde_json::from_value(arguments) {
                Ok(args) => Ok(self.write_file(args).await),
                Err(err) => Ok(CallToolResult::error_text(format!("invalid arguments: {err}"))),
            },
            "list_dir" => match serde_json::from_value(arguments) {
                Ok(args) => Ok(self.list_dir(args).await),
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
    async fn read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FilesystemProvider::with_root(dir.path());

        let written = provider
            .call_tool(
                "write_file",
                json!({"path": "note.txt", "content": "hello"}),
            )
            .await
            .unwrap();
        assert!(!written.is_error);

        let read = provider
            .call_tool("read_file", json!({"path": "note.txt"}))
            .await
            .unwrap();
        assert_eq!(read.first_text(), Some("hello"));
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_level_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FilesystemProvider::with_root(dir.path());

        let result = provider
            .call_tool("read_file", json!({"path": "absent.txt"}))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn list_dir_sorts_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let provider = FilesystemProvider::with_root(dir.path());

        let result = provider
            .call_tool("list_dir", json!({"path": "."}))
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("a.txt\nb.txt"));
        assert_eq!(
            result.structured_content.unwrap()["entries"],
            json!(["a.txt", "b.txt"])
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        let provider = FilesystemProvider::new();
        let err = provider.call_tool("chmod", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }
}

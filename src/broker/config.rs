//! Server configuration loading.
//!
//! Configuration is a JSON document with a single top-level `servers`
//! object. The file is looked up at `<cwd>/.pryx/mcp/servers.json` and
//! then `<home>/.pryx/mcp/servers.json`; the first that exists wins, and
//! absence of any file is not an error (the manager falls back to its
//! bundled defaults).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Config file location relative to cwd or home.
pub const CONFIG_RELATIVE_PATH: &str = ".pryx/mcp/servers.json";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersFile {
    /// Configured servers by name.
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

/// Configuration for one tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which transport to build.
    pub transport: TransportKind,
    /// Endpoint URL (http transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Program and arguments (stdio transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Working directory for the child process (stdio transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment entries; configured entries override inherited
    /// ones (stdio transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Extra request headers (http transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Pinned protocol version for the initialize handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Credential reference (http transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

impl ServerConfig {
    /// A bundled-transport config (providers are resolved by server name).
    pub fn bundled() -> Self {
        Self {
            transport: TransportKind::Bundled,
            url: None,
            command: None,
            cwd: None,
            env: None,
            headers: None,
            protocol_version: None,
            auth: None,
        }
    }

    /// A stdio-transport config for `command`.
    pub fn stdio(command: Vec<String>) -> Self {
        Self {
            command: Some(command),
            ..Self::bundled()
        }
        .with_transport(TransportKind::Stdio)
    }

    /// An http-transport config for `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::bundled()
        }
        .with_transport(TransportKind::Http)
    }

    fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }
}

/// Transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process bundled provider.
    Bundled,
    /// Supervised subprocess over stdio.
    Stdio,
    /// HTTP endpoint.
    Http,
}

/// Credential reference attached to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Auth scheme; only `oauth` is recognized.
    #[serde(rename = "type")]
    pub auth_type: String,
    /// Symbolic token reference, e.g. `keychain:github`.
    pub token_ref: String,
}

/// Locate the configuration file: cwd first, then home.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Parse a configuration document.
pub fn parse(content: &str) -> Result<ServersFile> {
    serde_json::from_str(content)
        .map_err(|err| Error::Config(format!("invalid servers file: {err}")))
}

/// Load a configuration file from `path`.
pub fn load_file(path: &Path) -> Result<ServersFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_transport_kinds() {
        let file = parse(
            r#"{
                "servers": {
                    "fs": {"transport": "bundled"},
                    "git": {
                        "transport": "stdio",
                        "command": ["git-tools", "--serve"],
                        "cwd": "/tmp",
                        "env": {"GIT_TRACE": "1"}
                    },
                    "search": {
                        "transport": "http",
                        "url": "https://search.example/mcp",
                        "headers": {"X-Team": "core"},
                        "protocol_version": "2024-11-05",
                        "auth": {"type": "oauth", "token_ref": "keychain:search"}
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(file.servers.len(), 3);
        assert_eq!(file.servers["fs"].transport, TransportKind::Bundled);
        assert_eq!(
            file.servers["git"].command.as_deref(),
            Some(["git-tools".to_string(), "--serve".to_string()].as_slice())
        );
        let search = &file.servers["search"];
        assert_eq!(search.transport, TransportKind::Http);
        assert_eq!(search.auth.as_ref().unwrap().token_ref, "keychain:search");
        assert_eq!(search.protocol_version.as_deref(), Some("2024-11-05"));
    }

    #[test]
    fn empty_document_is_valid() {
        assert!(parse("{}").unwrap().servers.is_empty());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = parse("{servers}").unwrap_err();
        assert!(err.to_string().contains("invalid servers file"));
    }

    #[test]
    fn load_file_reports_path_on_io_error() {
        let err = load_file(Path::new("/nonexistent/servers.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/servers.json"));
    }

    #[test]
    fn load_file_round_trips_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, r#"{"servers": {"fs": {"transport": "bundled"}}}"#).unwrap();
        let file = load_file(&path).unwrap();
        assert!(file.servers.contains_key("fs"));
    }
}

//! The broker manager.
//!
//! A [`Manager`] owns one client session per configured server and is the
//! single entry point the surrounding runtime calls: it loads
//! configuration, routes namespaced tool names, gates calls through the
//! policy engine, coordinates out-of-band approvals, caches tool listings,
//! and publishes lifecycle events. All state is per-instance; construct
//! one manager per runtime.

pub mod config;
pub mod credentials;
pub mod events;
pub mod policy;

use crate::broker::config::{ServerConfig, TransportKind};
use crate::broker::credentials::{CredentialResolver, EnvCredentials};
use crate::broker::events::{topic, Event, EventBus, NullBus};
use crate::broker::policy::{AllowAll, PolicyEngine, Verdict};
use crate::bundled::BundledRegistry;
use crate::client::ClientSession;
use crate::error::{Error, Result};
use crate::shared::{BundledTransport, HttpTransport, HttpTransportConfig, StdioTransport, Transport};
use crate::types::{CallToolResult, ToolInfo};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

/// How long a cached tool listing stays fresh.
pub const LIST_CACHE_TTL: Duration = Duration::from_secs(30);

/// How long a call parks awaiting approval before giving up.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Out-of-band approval side channel.
///
/// When configured, the manager queries the delegate synchronously for
/// `ask` decisions instead of parking a pending record on the bus flow.
#[async_trait]
pub trait ApprovalDelegate: Send + Sync + std::fmt::Debug {
    /// Decide one call. `true` approves, `false` rejects.
    async fn decide(
        &self,
        session_id: &str,
        tool: &str,
        arguments: &Value,
        reason: &str,
    ) -> Result<bool>;
}

/// Snapshot of a parked approval, for UI layers.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    /// Approval id to pass to [`Manager::resolve_approval`].
    pub id: String,
    /// Session that issued the call.
    pub session_id: String,
    /// Audit name `mcp.<server>.<tool>`.
    pub tool: String,
    /// Reason from the policy decision.
    pub reason: String,
    /// Call arguments.
    pub args: Value,
}

/// A parked call awaiting approval. Owned by the manager until drained by
/// resolution, timeout, caller cancellation, or shutdown.
#[derive(Debug)]
struct PendingApproval {
    session_id: String,
    tool: String,
    reason: String,
    args: Value,
    /// Capacity-one rendezvous; receives exactly zero or one value.
    reply: oneshot::Sender<bool>,
}

#[derive(Debug)]
struct CacheEntry {
    fetched_at: Instant,
    tools: Vec<ToolInfo>,
}

/// Builder for [`Manager`].
#[derive(Debug)]
pub struct ManagerBuilder {
    registry: BundledRegistry,
    policy: Arc<dyn PolicyEngine>,
    events: Arc<dyn EventBus>,
    credentials: Arc<dyn CredentialResolver>,
    approver: Option<Arc<dyn ApprovalDelegate>>,
    servers: HashMap<String, ServerConfig>,
    config_path: Option<PathBuf>,
    approval_timeout: Duration,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self {
            registry: BundledRegistry::with_defaults(),
            policy: Arc::new(AllowAll),
            events: Arc::new(NullBus),
            credentials: Arc::new(EnvCredentials::new()),
            approver: None,
            servers: HashMap::new(),
            config_path: None,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }
}

impl ManagerBuilder {
    /// Replace the bundled provider registry.
    pub fn registry(mut self, registry: BundledRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the policy engine (default: allow everything).
    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    /// Set the event bus (default: discard events).
    pub fn events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Set the credential resolver (default: environment lookup).
    pub fn credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Route `ask` decisions to a host-process delegate instead of the
    /// pending-approval rendezvous.
    pub fn approver(mut self, approver: Arc<dyn ApprovalDelegate>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Add an explicit server, bypassing the configuration file.
    pub fn server(mut self, name: impl Into<String>, config: ServerConfig) -> Self {
        self.servers.insert(name.into(), config);
        self
    }

    /// Read configuration from `path` instead of the default locations.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the approval deadline (default 120 s).
    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Build the manager. Call
    /// [`load_and_connect`](Manager::load_and_connect) before using it.
    pub fn build(self) -> Manager {
        Manager {
            clients: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            registry: self.registry,
            policy: self.policy,
            events: self.events,
            credentials: self.credentials,
            approver: self.approver,
            servers_override: self.servers,
            config_path: self.config_path,
            approval_timeout: self.approval_timeout,
            approval_seq: AtomicU64::new(1),
        }
    }
}

/// The tool-call broker.
#[derive(Debug)]
pub struct Manager {
    /// Client sessions by server name. Replaced wholesale by
    /// `load_and_connect`, under the same lock the call path reads.
    clients: RwLock<HashMap<String, Arc<ClientSession>>>,
    /// Tool-listing cache by server name.
    cache: Mutex<HashMap<String, CacheEntry>>,
    /// Parked approvals by approval id. Guarded by its own mutex so
    /// listing and calling never stall approval resolution.
    pending: Mutex<HashMap<String, PendingApproval>>,
    registry: BundledRegistry,
    policy: Arc<dyn PolicyEngine>,
    events: Arc<dyn EventBus>,
    credentials: Arc<dyn CredentialResolver>,
    approver: Option<Arc<dyn ApprovalDelegate>>,
    servers_override: HashMap<String, ServerConfig>,
    config_path: Option<PathBuf>,
    approval_timeout: Duration,
    approval_seq: AtomicU64,
}

impl Manager {
    /// Start building a manager.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    /// Load server configuration and connect every session.
    ///
    /// Sessions are initialized in parallel; if any fails, all are closed
    /// and the first error (in server-name order) is returned. On success
    /// the client map is atomically replaced and the listing cache is
    /// invalidated. Returns the configuration path used, if a file was
    /// read.
    pub async fn load_and_connect(&self) -> Result<Option<PathBuf>> {
        let (path, mut servers) = self.load_servers()?;
        if servers.is_empty() && path.is_none() {
            for name in self.registry.names() {
                servers.insert(name, ServerConfig::bundled());
            }
        }

        let mut names: Vec<String> = servers.keys().cloned().collect();
        names.sort();

        let mut sessions: Vec<(String, Arc<ClientSession>)> = Vec::with_capacity(names.len());
        for name in names {
            let cfg = &servers[&name];
            let session = self.build_client(&name, cfg).await?;
            sessions.push((name, Arc::new(session)));
        }

        let results = futures::future::join_all(sessions.iter().map(|(name, session)| {
            let name = name.clone();
            let session = session.clone();
            async move {
                session.ensure_initialized().await.map_err(|err| {
                    warn!(server = %name, %err, "failed to initialize server");
                    err
                })
            }
        }))
        .await;

        if let Some(err) = results.into_iter().find_map(std::result::Result::err) {
            for (_, session) in &sessions {
                let _ = session.close().await;
            }
            return Err(err);
        }

        *self.clients.write() = sessions.into_iter().collect();
        self.cache.lock().clear();
        debug!(path = ?path, "connected to all configured servers");
        Ok(path)
    }

    fn load_servers(&self) -> Result<(Option<PathBuf>, HashMap<String, ServerConfig>)> {
        if !self.servers_override.is_empty() {
            return Ok((None, self.servers_override.clone()));
        }
        if let Some(path) = &self.config_path {
            let file = config::load_file(path)?;
            return Ok((Some(path.clone()), file.servers));
        }
        match config::resolve_config_path() {
            Some(path) => {
                let file = config::load_file(&path)?;
                Ok((Some(path), file.servers))
            },
            None => Ok((None, HashMap::new())),
        }
    }

    /// Build a client session for one server config.
    async fn build_client(&self, name: &str, cfg: &ServerConfig) -> Result<ClientSession> {
        let transport: Arc<dyn Transport> = match cfg.transport {
            TransportKind::Bundled => {
                Arc::new(BundledTransport::new(self.registry.resolve(name)?))
            },
            TransportKind::Stdio => {
                let command = cfg
                    .command
                    .clone()
                    .filter(|command| !command.is_empty())
                    .ok_or_else(|| {
                        Error::Config(format!("server '{name}': stdio transport requires a command"))
                    })?;
                Arc::new(StdioTransport::new(
                    command,
                    cfg.cwd.clone(),
                    cfg.env.clone().unwrap_or_default(),
                )?)
            },
            TransportKind::Http => {
                let raw = cfg.url.as_deref().ok_or_else(|| {
                    Error::Config(format!("server '{name}': http transport requires a url"))
                })?;
                let url = Url::parse(raw)
                    .map_err(|err| Error::Config(format!("server '{name}': invalid url: {err}")))?;
                let mut http = HttpTransportConfig::new(url);
                if let Some(headers) = &cfg.headers {
                    let mut pairs: Vec<(String, String)> = headers
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    pairs.sort();
                    http.headers = pairs;
                }
                if let Some(auth) = &cfg.auth {
                    http.bearer_token = Some(
                        credentials::resolve_bearer(self.credentials.as_ref(), auth).await?,
                    );
                }
                Arc::new(HttpTransport::new(http)?)
            },
        };
        Ok(ClientSession::new(name, transport, cfg.protocol_version.clone()))
    }

    /// List tools for every connected server. Cached per server for
    /// [`LIST_CACHE_TTL`]; `refresh` forces a live fetch.
    pub async fn list_tools(&self, refresh: bool) -> Result<HashMap<String, Vec<ToolInfo>>> {
        let clients: Vec<(String, Arc<ClientSession>)> = self
            .clients
            .read()
            .iter()
            .map(|(name, session)| (name.clone(), session.clone()))
            .collect();

        let mut out = HashMap::with_capacity(clients.len());
        for (name, session) in clients {
            let tools = self.list_tools_cached(&name, &session, refresh).await?;
            out.insert(name, tools);
        }
        Ok(out)
    }

    async fn list_tools_cached(
        &self,
        name: &str,
        session: &ClientSession,
        refresh: bool,
    ) -> Result<Vec<ToolInfo>> {
        if !refresh {
            if let Some(entry) = self.cache.lock().get(name) {
                if entry.fetched_at.elapsed() < LIST_CACHE_TTL {
                    return Ok(entry.tools.clone());
                }
            }
        }

        let tools = session.list_tools().await?;
        self.cache.lock().insert(
            name.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                tools: tools.clone(),
            },
        );
        Ok(tools)
    }

    /// List tools across all servers with names prefixed `<server>:`,
    /// sorted for stable output.
    pub async fn list_tools_flat(&self, refresh: bool) -> Result<Vec<ToolInfo>> {
        let by_server = self.list_tools(refresh).await?;
        let mut flat = Vec::new();
        for (server, tools) in by_server {
            for mut tool in tools {
                tool.name = format!("{server}:{}", tool.name);
                flat.push(tool);
            }
        }
        flat.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(flat)
    }

    /// Dispatch a namespaced tool call on behalf of `session_id`.
    ///
    /// `name` is `<server>:<tool>` (or `<server>/<tool>`). The call is
    /// evaluated by the policy engine under the audit name
    /// `mcp.<server>.<tool>`, possibly parked for approval, then forwarded
    /// to the server's client session with the bare tool name. A result
    /// with `is_error = true` is still `Ok`: it is the tool reporting
    /// failure, and `tool.complete` is published for it.
    pub async fn call_tool(
        &self,
        session_id: &str,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult> {
        let (server, tool) = split_tool_name(name)?;
        let session = self
            .clients
            .read()
            .get(server)
            .cloned()
            .ok_or_else(|| Error::UnknownServer(server.to_string()))?;

        let audit_name = format!("mcp.{server}.{tool}");
        let decision = self.policy.evaluate(&audit_name, &arguments).await;
        debug!(
            session_id,
            tool = %audit_name,
            verdict = decision.verdict.as_str(),
            "tool call requested"
        );
        self.publish(
            session_id,
            topic::TOOL_REQUEST,
            json!({
                "tool": &audit_name,
                "args": &arguments,
                "decision": decision.verdict.as_str(),
            }),
        );

        match decision.verdict {
            Verdict::Allow => {},
            Verdict::Deny => return Err(Error::PolicyDenied(decision.reason)),
            Verdict::Ask => {
                self.await_approval(session_id, &audit_name, &arguments, &decision.reason)
                    .await?;
            },
            Verdict::Other(other) => return Err(Error::UnknownDecision(other)),
        }

        self.publish(
            session_id,
            topic::TOOL_EXECUTING,
            json!({ "tool": &audit_name }),
        );
        match session.call_tool(tool, arguments).await {
            Ok(result) => {
                self.publish(
                    session_id,
                    topic::TOOL_COMPLETE,
                    json!({ "tool": &audit_name, "result": &result }),
                );
                Ok(result)
            },
            Err(err) => {
                self.publish(
                    session_id,
                    topic::ERROR_OCCURRED,
                    json!({ "tool": &audit_name, "error": err.to_string() }),
                );
                Err(err)
            },
        }
    }

    /// Park the caller until the approval resolves, the deadline passes,
    /// or the caller cancels. With a delegate configured, query it
    /// instead.
    async fn await_approval(
        &self,
        session_id: &str,
        tool: &str,
        args: &Value,
        reason: &str,
    ) -> Result<()> {
        let approval_id = self.next_approval_id(session_id);

        if let Some(delegate) = &self.approver {
            self.publish(
                session_id,
                topic::APPROVAL_NEEDED,
                json!({
                    "approval_id": &approval_id,
                    "tool": tool,
                    "args": args,
                    "reason": reason,
                }),
            );
            let approved = delegate.decide(session_id, tool, args, reason).await?;
            self.publish(
                session_id,
                topic::APPROVAL_RESOLVED,
                json!({ "approval_id": &approval_id, "tool": tool, "approved": approved }),
            );
            return if approved {
                Ok(())
            } else {
                Err(Error::ApprovalDenied)
            };
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            approval_id.clone(),
            PendingApproval {
                session_id: session_id.to_string(),
                tool: tool.to_string(),
                reason: reason.to_string(),
                args: args.clone(),
                reply: tx,
            },
        );
        // Drains the record if the wait ends without resolution (timeout
        // or caller cancellation); a no-op after resolve_approval.
        let _guard = PendingGuard {
            manager: self,
            id: approval_id.clone(),
        };

        self.publish(
            session_id,
            topic::APPROVAL_NEEDED,
            json!({
                "approval_id": &approval_id,
                "tool": tool,
                "args": args,
                "reason": reason,
            }),
        );

        match tokio::time::timeout(self.approval_timeout, rx).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(Error::ApprovalDenied),
            Ok(Err(_)) => Err(Error::ApprovalCancelled),
            Err(_) => Err(Error::ApprovalTimeout),
        }
    }

    fn next_approval_id(&self, session_id: &str) -> String {
        // Monotonic within the process; wall-clock suffixes could collide
        // under clock adjustment.
        let seq = self.approval_seq.fetch_add(1, Ordering::Relaxed);
        format!("{session_id}-{seq}")
    }

    /// Resolve a parked approval. Returns `false` when the id is unknown
    /// or already drained; resolving twice is a no-op.
    pub fn resolve_approval(&self, approval_id: &str, approved: bool) -> bool {
        let Some(pending) = self.pending.lock().remove(approval_id) else {
            return false;
        };
        // Best-effort: the waiter may have timed out or cancelled between
        // removal and send.
        let _ = pending.reply.send(approved);
        self.publish(
            &pending.session_id,
            topic::APPROVAL_RESOLVED,
            json!({
                "approval_id": approval_id,
                "tool": &pending.tool,
                "approved": approved,
            }),
        );
        true
    }

    /// Snapshot of all parked approvals.
    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .iter()
            .map(|(id, pending)| ApprovalRequest {
                id: id.clone(),
                session_id: pending.session_id.clone(),
                tool: pending.tool.clone(),
                reason: pending.reason.clone(),
                args: pending.args.clone(),
            })
            .collect()
    }

    /// Publish an arbitrary diagnostic event.
    pub fn trace(&self, session_id: &str, payload: Value) {
        self.publish(session_id, topic::TRACE_EVENT, payload);
    }

    /// Names of currently connected servers, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Tear down the broker: discard parked approvals (their callers fail
    /// with "approval cancelled") and close every client session.
    pub async fn close(&self) -> Result<()> {
        self.pending.lock().clear();
        let sessions: Vec<(String, Arc<ClientSession>)> =
            self.clients.write().drain().collect();
        for (name, session) in sessions {
            if let Err(err) = session.close().await {
                warn!(server = %name, %err, "failed to close client session");
            }
        }
        Ok(())
    }

    fn publish(&self, session_id: &str, topic: &'static str, payload: Value) {
        self.events.publish(Event {
            session_id: session_id.to_string(),
            topic,
            payload,
        });
    }
}

/// Removes a pending approval when the waiting call unwinds.
struct PendingGuard<'a> {
    manager: &'a Manager,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.manager.pending.lock().remove(&self.id);
    }
}

/// Split a namespaced tool name into `(server, tool)`. `:` is the
/// preferred separator with `/` as a fallback; neither half may be empty
/// after trimming.
pub fn split_tool_name(name: &str) -> Result<(&str, &str)> {
    let (server, tool) = name
        .split_once(':')
        .or_else(|| name.split_once('/'))
        .ok_or_else(|| Error::InvalidToolName(name.to_string()))?;
    let server = server.trim();
    let tool = tool.trim();
    if server.is_empty() || tool.is_empty() {
        return Err(Error::InvalidToolName(name.to_string()));
    }
    Ok((server, tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_prefers_colon_and_falls_back_to_slash() {
        assert_eq!(split_tool_name("fs:read_file").unwrap(), ("fs", "read_file"));
        assert_eq!(split_tool_name("fs/read_file").unwrap(), ("fs", "read_file"));
        // With both separators present the colon wins.
        assert_eq!(split_tool_name("fs:dir/read").unwrap(), ("fs", "dir/read"));
    }

    #[test]
    fn split_rejects_empty_halves() {
        assert!(split_tool_name("fs:").is_err());
        assert!(split_tool_name(":read").is_err());
        assert!(split_tool_name("  : ").is_err());
        assert!(split_tool_name("plain").is_err());
    }

    #[test]
    fn approval_ids_are_unique_per_manager() {
        let manager = Manager::builder().build();
        let a = manager.next_approval_id("sess");
        let b = manager.next_approval_id("sess");
        assert_ne!(a, b);
        assert!(a.starts_with("sess-"));
    }

    #[test]
    fn resolve_unknown_approval_returns_false() {
        let manager = Manager::builder().build();
        assert!(!manager.resolve_approval("sess-1", true));
    }
}

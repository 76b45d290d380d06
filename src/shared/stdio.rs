//! Child-process stdio transport.
//!
//! Supervises a tool server subprocess and exchanges newline-delimited
//! JSON-RPC frames over its stdin/stdout. The process is started lazily on
//! the first `call` or `notify`, exactly once; concurrent first calls wait
//! for the start to finish and observe its outcome. Replies are routed to
//! waiters by id-key; when the child exits or stdout reaches EOF the
//! transport transitions to closed and all outstanding waiters are
//! unblocked with "transport closed". The broker never restarts a closed
//! transport.

use crate::error::{Result, TransportError};
use crate::shared::transport::Transport;
use crate::types::{JSONRPCNotification, JSONRPCRequest, JSONRPCResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::debug;

/// Reader line buffer capacity. Large tool results arrive as one line, so
/// the buffer must tolerate at least 1 MiB frames.
const READER_BUFFER_CAPACITY: usize = 1024 * 1024;

/// stdio transport supervising a child tool-server process.
#[derive(Debug)]
pub struct StdioTransport {
    command: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    state: tokio::sync::Mutex<StartState>,
}

#[derive(Debug)]
enum StartState {
    Idle,
    Running(Arc<StdioConnection>),
    Failed(String),
    Closed,
}

impl StdioTransport {
    /// Create a transport for `command` (program followed by arguments).
    ///
    /// The process environment is inherited and merged with `env`, with
    /// configured entries taking precedence. The child is not started
    /// until the first request.
    pub fn new(
        command: Vec<String>,
        cwd: Option<PathBuf>,
        env: HashMap<String, String>,
    ) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(crate::error::Error::Config(
                "stdio transport requires a non-empty command".to_string(),
            ));
        }
        Ok(Self {
            command,
            cwd,
            env,
            state: tokio::sync::Mutex::new(StartState::Idle),
        })
    }

    /// Get or lazily establish the child connection. The state mutex makes
    /// the start exactly-once: concurrent starters queue here and observe
    /// the stored outcome.
    async fn connection(&self) -> Result<Arc<StdioConnection>> {
        let mut state = self.state.lock().await;
        match &*state {
            StartState::Running(conn) => {
                return if conn.is_closed() {
                    Err(TransportError::Closed.into())
                } else {
                    Ok(conn.clone())
                };
            },
            StartState::Closed => return Err(TransportError::Closed.into()),
            StartState::Failed(reason) => {
                return Err(
                    TransportError::Request(format!("spawn previously failed: {reason}")).into(),
                );
            },
            StartState::Idle => {},
        }

        match self.spawn() {
            Ok(conn) => {
                *state = StartState::Running(conn.clone());
                Ok(conn)
            },
            Err(err) => {
                *state = StartState::Failed(err.to_string());
                Err(err)
            },
        }
    }

    fn spawn(&self) -> Result<Arc<StdioConnection>> {
        let program = &self.command[0];
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: program.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Request("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Request("child has no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let command = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(%command, "server stderr: {line}");
                }
            });
        }

        debug!(%program, "started tool server process");

        let conn = Arc::new(StdioConnection {
            stdin: tokio::sync::Mutex::new(stdin),
            pending: parking_lot::Mutex::new(Some(HashMap::new())),
            child: parking_lot::Mutex::new(Some(child)),
        });
        tokio::spawn(read_loop(conn.clone(), stdout));
        Ok(conn)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, request: JSONRPCRequest) -> Result<JSONRPCResponse> {
        let conn = self.connection().await?;
        let frame = serde_json::to_vec(&request)?;
        let key = request.id.key();
        let rx = conn.register(&key)?;
        // Deregisters the reply slot if the caller cancels or the write
        // fails; delivery already removed the entry on the happy path.
        let _slot = ReplySlot {
            conn: conn.clone(),
            key,
        };

        conn.write_frame(&frame).await?;

        match rx.await {
            Ok(response) => Ok(response),
            Err(_) => Err(TransportError::Closed.into()),
        }
    }

    async fn notify(&self, notification: JSONRPCNotification) -> Result<()> {
        let conn = self.connection().await?;
        let frame = serde_json::to_vec(&notification)?;
        conn.write_frame(&frame).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let StartState::Running(conn) = std::mem::replace(&mut *state, StartState::Closed) {
            conn.shutdown();
        }
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

/// Live connection to a running child: write half, reply map, child handle.
#[derive(Debug)]
struct StdioConnection {
    stdin: tokio::sync::Mutex<ChildStdin>,
    /// Reply slots keyed by id-key. `None` once the transport is closed.
    pending: parking_lot::Mutex<Option<HashMap<String, oneshot::Sender<JSONRPCResponse>>>>,
    child: parking_lot::Mutex<Option<Child>>,
}

impl StdioConnection {
    fn is_closed(&self) -> bool {
        self.pending.lock().is_none()
    }

    /// Register a reply slot under `key`.
    fn register(&self, key: &str) -> Result<oneshot::Receiver<JSONRPCResponse>> {
        let mut pending = self.pending.lock();
        let map = pending.as_mut().ok_or(TransportError::Closed)?;
        if map.contains_key(key) {
            return Err(TransportError::InvalidMessage(format!(
                "duplicate in-flight request id {key}"
            ))
            .into());
        }
        let (tx, rx) = oneshot::channel();
        map.insert(key.to_string(), tx);
        Ok(rx)
    }

    fn deregister(&self, key: &str) {
        if let Some(map) = self.pending.lock().as_mut() {
            map.remove(key);
        }
    }

    /// Route a response to its waiter. Responses with no registered waiter
    /// are dropped.
    fn deliver(&self, response: JSONRPCResponse) {
        let key = response.id.key();
        let sender = self.pending.lock().as_mut().and_then(|map| map.remove(&key));
        match sender {
            Some(tx) => {
                let _ = tx.send(response);
            },
            None => debug!(%key, "dropping response with no waiting request"),
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(frame).await.map_err(TransportError::from)?;
        stdin.write_all(b"\n").await.map_err(TransportError::from)?;
        stdin.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    /// Transition to closed: drop all reply slots (unblocking waiters with
    /// "transport closed") and reclaim the child process.
    fn shutdown(&self) {
        let drained = self.pending.lock().take();
        if let Some(map) = drained {
            if !map.is_empty() {
                debug!(outstanding = map.len(), "closing transport with waiters");
            }
        }
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

/// Removes a registered reply slot on drop. A no-op if delivery or
/// shutdown already consumed the entry.
struct ReplySlot {
    conn: Arc<StdioConnection>,
    key: String,
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        self.conn.deregister(&self.key);
    }
}

/// Reader loop: one JSON frame per stdout line. Unknown and malformed
/// frames are dropped. EOF closes the transport.
async fn read_loop(conn: Arc<StdioConnection>, stdout: ChildStdout) {
    let mut reader = BufReader::with_capacity(READER_BUFFER_CAPACITY, stdout);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JSONRPCResponse>(frame) {
                    Ok(response) => conn.deliver(response),
                    Err(err) => debug!(%err, "dropping unrecognized frame"),
                }
            },
            Err(err) => {
                debug!(%err, "stdout read failed");
                break;
            },
        }
    }
    debug!("tool server stdout reached EOF, closing transport");
    conn.shutdown();
}

//! Manager behavior: policy gating, approvals, listing cache, namespaced
//! routing, and event ordering.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use pryx_broker::broker::config::ServerConfig;
use pryx_broker::broker::events::{topic, BroadcastBus, Event};
use pryx_broker::broker::policy::{Decision, PolicyEngine, TablePolicy, Verdict};
use pryx_broker::bundled::{BundledRegistry, ToolProvider};
use pryx_broker::types::protocol::Implementation;
use pryx_broker::types::{CallToolResult, ToolInfo};
use pryx_broker::{Error, Manager, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bundled provider that counts listing and call traffic.
#[derive(Debug, Default)]
struct CountingProvider {
    lists: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ToolProvider for CountingProvider {
    fn server_info(&self) -> Implementation {
        Implementation::new("counter", "0.0.1")
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ToolInfo::new("t1", None, json!({"type": "object"}))])
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<CallToolResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "t1" => Ok(CallToolResult::text("ok")),
            "explode" => Err(Error::Protocol("tool exploded".to_string())),
            other => Ok(CallToolResult::error_text(format!("unknown tool: {other}"))),
        }
    }
}

#[derive(Debug)]
struct FixedPolicy(Decision);

#[async_trait]
impl PolicyEngine for FixedPolicy {
    async fn evaluate(&self, _tool: &str, _arguments: &Value) -> Decision {
        self.0.clone()
    }
}

struct Fixture {
    manager: Arc<Manager>,
    provider: Arc<CountingProvider>,
    bus: Arc<BroadcastBus>,
}

async fn fixture_with(policy: Decision, approval_timeout: Duration) -> Fixture {
    let provider = Arc::new(CountingProvider::default());
    let mut registry = BundledRegistry::new();
    registry.register("counter", provider.clone());

    let bus = Arc::new(BroadcastBus::new(64));
    let manager = Manager::builder()
        .registry(registry)
        .events(bus.clone())
        .policy(Arc::new(FixedPolicy(policy)))
        .approval_timeout(approval_timeout)
        .server("counter", ServerConfig::bundled())
        .build();
    manager.load_and_connect().await.unwrap();

    Fixture {
        manager: Arc::new(manager),
        provider,
        bus,
    }
}

async fn fixture(policy: Decision) -> Fixture {
    fixture_with(policy, Duration::from_secs(5)).await
}

/// Drain everything currently sitting in the subscription.
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn topics(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|event| event.topic).collect()
}

#[tokio::test]
async fn allow_path_emits_ordered_events() {
    let fx = fixture(Decision::allow("fine")).await;
    let mut rx = fx.bus.subscribe();

    let result = fx
        .manager
        .call_tool("sess", "counter:t1", json!({"k": "v"}))
        .await
        .unwrap();
    assert_eq!(result.first_text(), Some("ok"));

    let events = drain(&mut rx);
    assert_eq!(
        topics(&events),
        vec![topic::TOOL_REQUEST, topic::TOOL_EXECUTING, topic::TOOL_COMPLETE]
    );
    assert_eq!(events[0].payload["tool"], "mcp.counter.t1");
    assert_eq!(events[0].payload["decision"], "allow");
    assert_eq!(events[0].payload["args"], json!({"k": "v"}));
    assert_eq!(events[0].session_id, "sess");
    assert_eq!(events[2].payload["result"]["isError"], json!(false));
}

#[tokio::test]
async fn deny_never_reaches_the_transport() {
    let fx = fixture(Decision::deny("forbidden tool")).await;
    let mut rx = fx.bus.subscribe();

    let err = fx
        .manager
        .call_tool("sess", "counter:t1", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("denied by policy"));
    assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert_eq!(topics(&events), vec![topic::TOOL_REQUEST]);
    assert_eq!(events[0].payload["decision"], "deny");
}

#[tokio::test]
async fn unknown_decision_is_rejected() {
    let fx = fixture(Decision {
        verdict: Verdict::Other("maybe".to_string()),
        reason: "???".to_string(),
    })
    .await;

    let err = fx
        .manager
        .call_tool("sess", "counter:t1", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown policy decision"));
    assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn approval_resolved_completes_the_call() {
    let fx = fixture(Decision::ask("needs review")).await;
    let mut rx = fx.bus.subscribe();

    let manager = fx.manager.clone();
    let call = tokio::spawn(async move {
        manager.call_tool("sess", "counter:t1", json!({})).await
    });

    // Wait for the approval request on the bus.
    let approval_id = loop {
        let event = rx.recv().await.unwrap();
        if event.topic == topic::APPROVAL_NEEDED {
            assert_eq!(event.payload["tool"], "mcp.counter.t1");
            assert_eq!(event.payload["reason"], "needs review");
            break event.payload["approval_id"].as_str().unwrap().to_string();
        }
    };
    assert_eq!(fx.manager.pending_approvals().len(), 1);

    assert!(fx.manager.resolve_approval(&approval_id, true));
    let result = call.await.unwrap().unwrap();
    assert_eq!(result.first_text(), Some("ok"));
    assert!(fx.manager.pending_approvals().is_empty());

    // Approval idempotence: the record is drained.
    assert!(!fx.manager.resolve_approval(&approval_id, true));

    let events = drain(&mut rx);
    assert_eq!(
        topics(&events),
        vec![topic::APPROVAL_RESOLVED, topic::TOOL_EXECUTING, topic::TOOL_COMPLETE]
    );
    assert_eq!(events[0].payload["approved"], json!(true));
}

#[tokio::test]
async fn approval_rejection_denies_the_call() {
    let fx = fixture(Decision::ask("needs review")).await;
    let mut rx = fx.bus.subscribe();

    let manager = fx.manager.clone();
    let call = tokio::spawn(async move {
        manager.call_tool("sess", "counter:t1", json!({})).await
    });

    let approval_id = loop {
        let event = rx.recv().await.unwrap();
        if event.topic == topic::APPROVAL_NEEDED {
            break event.payload["approval_id"].as_str().unwrap().to_string();
        }
    };
    assert!(fx.manager.resolve_approval(&approval_id, false));

    let err = call.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("denied by user"));
    assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 0);
    assert!(fx.manager.pending_approvals().is_empty());

    let events = drain(&mut rx);
    assert_eq!(topics(&events), vec![topic::APPROVAL_RESOLVED]);
    assert_eq!(events[0].payload["approved"], json!(false));
}

#[tokio::test]
async fn approval_timeout_drains_the_record() {
    let fx = fixture_with(Decision::ask("needs review"), Duration::from_millis(100)).await;

    let err = fx
        .manager
        .call_tool("sess", "counter:t1", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("approval timed out"));
    assert!(fx.manager.pending_approvals().is_empty());
    assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn caller_cancellation_drains_the_record() {
    let fx = fixture(Decision::ask("needs review")).await;
    let mut rx = fx.bus.subscribe();

    let manager = fx.manager.clone();
    let call = tokio::spawn(async move {
        manager.call_tool("sess", "counter:t1", json!({})).await
    });

    loop {
        let event = rx.recv().await.unwrap();
        if event.topic == topic::APPROVAL_NEEDED {
            break;
        }
    }
    assert_eq!(fx.manager.pending_approvals().len(), 1);

    call.abort();
    let _ = call.await;
    // The drop guard runs as the task unwinds.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.manager.pending_approvals().is_empty());
}

#[tokio::test]
async fn error_path_emits_error_occurred() {
    let fx = fixture(Decision::allow("fine")).await;
    let mut rx = fx.bus.subscribe();

    let err = fx
        .manager
        .call_tool("sess", "counter:explode", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("mcp error -32000"));

    let events = drain(&mut rx);
    assert_eq!(
        topics(&events),
        vec![topic::TOOL_REQUEST, topic::TOOL_EXECUTING, topic::ERROR_OCCURRED]
    );
    assert_eq!(events[2].payload["tool"], "mcp.counter.explode");
    assert!(events[2].payload["error"].as_str().unwrap().contains("-32000"));
}

#[tokio::test]
async fn tool_level_failure_still_completes() {
    let fx = fixture(Decision::allow("fine")).await;
    let mut rx = fx.bus.subscribe();

    let result = fx
        .manager
        .call_tool("sess", "counter:unlisted", json!({}))
        .await
        .unwrap();
    assert!(result.is_error);

    let events = drain(&mut rx);
    assert_eq!(
        topics(&events),
        vec![topic::TOOL_REQUEST, topic::TOOL_EXECUTING, topic::TOOL_COMPLETE]
    );
    assert_eq!(events[2].payload["result"]["isError"], json!(true));
}

#[tokio::test]
async fn listing_cache_honors_ttl_and_refresh() {
    let fx = fixture(Decision::allow("fine")).await;

    let first = fx.manager.list_tools(false).await.unwrap();
    assert_eq!(fx.provider.lists.load(Ordering::SeqCst), 1);

    // Under TTL the cached listing is returned verbatim.
    let second = fx.manager.list_tools(false).await.unwrap();
    assert_eq!(fx.provider.lists.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);

    // refresh=true always hits the transport.
    fx.manager.list_tools(true).await.unwrap();
    assert_eq!(fx.provider.lists.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn flat_names_round_trip_to_their_server() {
    let fx = fixture(Decision::allow("fine")).await;

    let flat = fx.manager.list_tools_flat(false).await.unwrap();
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].name, "counter:t1");

    for tool in &flat {
        let result = fx.manager.call_tool("sess", &tool.name, json!({})).await.unwrap();
        assert!(!result.is_error);
    }
    assert_eq!(fx.provider.calls.load(Ordering::SeqCst), flat.len());
}

#[tokio::test]
async fn unknown_server_and_malformed_names_are_rejected() {
    let fx = fixture(Decision::allow("fine")).await;

    let err = fx
        .manager
        .call_tool("sess", "ghost:t1", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown server"));

    let err = fx
        .manager
        .call_tool("sess", "no-separator", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid tool name"));
}

#[tokio::test]
async fn table_policy_gates_by_pattern() {
    let provider = Arc::new(CountingProvider::default());
    let mut registry = BundledRegistry::new();
    registry.register("counter", provider.clone());

    let policy = TablePolicy::new(Decision::allow("default"))
        .rule("mcp.counter.explode", Decision::deny("known bad"))
        .unwrap();

    let manager = Manager::builder()
        .registry(registry)
        .policy(Arc::new(policy))
        .server("counter", ServerConfig::bundled())
        .build();
    manager.load_and_connect().await.unwrap();

    let err = manager
        .call_tool("sess", "counter:explode", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("denied by policy"));

    let result = manager.call_tool("sess", "counter:t1", json!({})).await.unwrap();
    assert_eq!(result.first_text(), Some("ok"));
}

#[tokio::test]
async fn approval_delegate_short_circuits_pending_records() {
    #[derive(Debug)]
    struct AutoApprove;

    #[async_trait]
    impl pryx_broker::broker::ApprovalDelegate for AutoApprove {
        async fn decide(
            &self,
            _session_id: &str,
            _tool: &str,
            _arguments: &Value,
            _reason: &str,
        ) -> Result<bool> {
            Ok(true)
        }
    }

    let provider = Arc::new(CountingProvider::default());
    let mut registry = BundledRegistry::new();
    registry.register("counter", provider.clone());
    let bus = Arc::new(BroadcastBus::new(64));

    let manager = Manager::builder()
        .registry(registry)
        .events(bus.clone())
        .policy(Arc::new(FixedPolicy(Decision::ask("always ask"))))
        .approver(Arc::new(AutoApprove))
        .server("counter", ServerConfig::bundled())
        .build();
    manager.load_and_connect().await.unwrap();
    let mut rx = bus.subscribe();

    let result = manager.call_tool("sess", "counter:t1", json!({})).await.unwrap();
    assert_eq!(result.first_text(), Some("ok"));
    assert!(manager.pending_approvals().is_empty());

    let events = drain(&mut rx);
    assert_eq!(
        topics(&events),
        vec![
            topic::TOOL_REQUEST,
            topic::APPROVAL_NEEDED,
            topic::APPROVAL_RESOLVED,
            topic::TOOL_EXECUTING,
            topic::TOOL_COMPLETE,
        ]
    );
}

#[tokio::test]
async fn close_cancels_parked_approvals() {
    let fx = fixture(Decision::ask("needs review")).await;
    let mut rx = fx.bus.subscribe();

    let manager = fx.manager.clone();
    let call = tokio::spawn(async move {
        manager.call_tool("sess", "counter:t1", json!({})).await
    });

    loop {
        let event = rx.recv().await.unwrap();
        if event.topic == topic::APPROVAL_NEEDED {
            break;
        }
    }

    fx.manager.close().await.unwrap();
    let err = call.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("approval cancelled"));
    assert!(fx.manager.pending_approvals().is_empty());
}

#[tokio::test]
async fn default_registry_seeds_when_no_config_exists() {
    // No explicit servers and no config file: the manager seeds its
    // bundled registry deterministically.
    let manager = Manager::builder().build();
    let path = manager.load_and_connect().await.unwrap();
    if path.is_none() {
        assert_eq!(manager.server_names(), vec!["filesystem", "shell"]);
    }
    manager.close().await.unwrap();
}

#[tokio::test]
async fn config_file_is_loaded_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    std::fs::write(
        &path,
        r#"{"servers": {"filesystem": {"transport": "bundled"}}}"#,
    )
    .unwrap();

    let manager = Manager::builder().config_path(&path).build();
    let used = manager.load_and_connect().await.unwrap();
    assert_eq!(used.as_deref(), Some(path.as_path()));
    assert_eq!(manager.server_names(), vec!["filesystem"]);
}

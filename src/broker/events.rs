//! Lifecycle event bus.
//!
//! The manager publishes events tagged with a session id; the bus is
//! non-blocking from the publisher's perspective, and slow subscribers may
//! miss events. The broker never consumes from the bus.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Normative topic names.
pub mod topic {
    /// A call was received and evaluated; payload `tool, args, decision`.
    pub const TOOL_REQUEST: &str = "tool.request";
    /// A call is parked awaiting approval; payload
    /// `approval_id, tool, args, reason`.
    pub const APPROVAL_NEEDED: &str = "approval.needed";
    /// An approval was granted or rejected; payload
    /// `approval_id, tool, approved`.
    pub const APPROVAL_RESOLVED: &str = "approval.resolved";
    /// The call is being dispatched; payload `tool`.
    pub const TOOL_EXECUTING: &str = "tool.executing";
    /// The call finished with a result; payload `tool, result`.
    pub const TOOL_COMPLETE: &str = "tool.complete";
    /// The call failed; payload `tool, error`.
    pub const ERROR_OCCURRED: &str = "error.occurred";
    /// Arbitrary diagnostic key/values.
    pub const TRACE_EVENT: &str = "trace.event";
}

/// One published event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Session the event belongs to.
    pub session_id: String,
    /// Topic name from [`topic`].
    pub topic: &'static str,
    /// Topic-specific payload.
    pub payload: Value,
}

/// Sink for broker lifecycle events. `publish` must not block.
pub trait EventBus: Send + Sync + std::fmt::Debug {
    /// Publish one event. Failures (e.g. no subscribers) are swallowed.
    fn publish(&self, event: Event);
}

/// Bus backed by a `tokio::sync::broadcast` channel. Publishing never
/// blocks; subscribers that lag beyond the channel capacity miss events.
#[derive(Debug)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastBus {
    /// Create a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: Event) {
        // send only fails when no subscriber exists, which is fine.
        let _ = self.tx.send(event);
    }
}

/// Bus that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: Event) {}
}

//! Policy engine contract and built-in engines.
//!
//! The broker evaluates every call against a [`PolicyEngine`] before any
//! transport work. Decisions are advisory to the engine but binding for
//! the broker: it never bypasses them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The action half of a policy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    /// Proceed without confirmation.
    Allow,
    /// Park the call until a human (or the host) confirms.
    Ask,
    /// Refuse the call.
    Deny,
    /// Anything the broker does not recognize; surfaces as an
    /// "unknown policy decision" error.
    Other(String),
}

impl Verdict {
    /// The wire form of the verdict.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
            Self::Deny => "deny",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        match s.as_str() {
            "allow" => Self::Allow,
            "ask" => Self::Ask,
            "deny" => Self::Deny,
            _ => Self::Other(s),
        }
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        v.as_str().to_string()
    }
}

/// A policy decision: verdict plus a human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// What the broker should do with the call.
    pub verdict: Verdict,
    /// Reason shown to humans (and carried on approval events).
    pub reason: String,
}

impl Decision {
    /// An `allow` decision.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: reason.into(),
        }
    }

    /// An `ask` decision.
    pub fn ask(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Ask,
            reason: reason.into(),
        }
    }

    /// A `deny` decision.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: reason.into(),
        }
    }
}

/// Decides what to do with a tool call.
///
/// `tool` is the canonical audit name `mcp.<server>.<tool>`. Engines may
/// consult external state but must be safe to call concurrently.
#[async_trait]
pub trait PolicyEngine: Send + Sync + std::fmt::Debug {
    /// Evaluate one call.
    async fn evaluate(&self, tool: &str, arguments: &Value) -> Decision;
}

/// Permits everything. The default engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl PolicyEngine for AllowAll {
    async fn evaluate(&self, _tool: &str, _arguments: &Value) -> Decision {
        Decision::allow("default policy")
    }
}

/// Glob-table policy: the first rule whose pattern matches the audit name
/// wins; unmatched calls get the default decision.
#[derive(Debug)]
pub struct TablePolicy {
    rules: Vec<(glob::Pattern, Decision)>,
    default: Decision,
}

impl TablePolicy {
    /// A table that falls back to `default` when no rule matches.
    pub fn new(default: Decision) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Append a rule. `pattern` is a glob over the audit name, e.g.
    /// `mcp.shell.*`.
    pub fn rule(mut self, pattern: &str, decision: Decision) -> Result<Self, crate::Error> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|err| crate::Error::Config(format!("invalid policy pattern: {err}")))?;
        self.rules.push((pattern, decision));
        Ok(self)
    }
}

#[async_trait]
impl PolicyEngine for TablePolicy {
    async fn evaluate(&self, tool: &str, _arguments: &Value) -> Decision {
        for (pattern, decision) in &self.rules {
            if pattern.matches(tool) {
                return decision.clone();
            }
        }
        self.default.clone()
    }
}

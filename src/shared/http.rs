//! One-shot HTTP transport with optional SSE-framed responses.
//!
//! Each `call` POSTs a single request envelope to the configured URL and
//! interprets the reply by content type: `application/json` bodies are a
//! single response envelope, `text/event-stream` bodies are scanned for
//! the record whose id matches the request. There is no persistent
//! connection and no retry at this layer.

use crate::error::{Result, TransportError};
use crate::shared::sse_parser::SseParser;
use crate::shared::transport::Transport;
use crate::types::{JSONRPCNotification, JSONRPCRequest, JSONRPCResponse, RequestId};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-call timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

const APPLICATION_JSON: &str = "application/json";
const TEXT_EVENT_STREAM: &str = "text/event-stream";
const ACCEPT_EITHER: &str = "application/json, text/event-stream";

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// The endpoint URL requests are POSTed to.
    pub url: Url,
    /// Additional headers included in every request.
    pub headers: Vec<(String, String)>,
    /// Bearer token injected as `Authorization: Bearer <token>`.
    pub bearer_token: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl HttpTransportConfig {
    /// Configuration with default timeout and no extra headers.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            bearer_token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// HTTP transport. Stateless per call; the underlying client and its
/// connection pool are shared across calls.
#[derive(Debug)]
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from configuration.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| TransportError::Request(format!("failed to build client: {err}")))?;
        Ok(Self { config, client })
    }

    async fn post(&self, body: Vec<u8>) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(self.config.url.as_str())
            .header("Content-Type", APPLICATION_JSON)
            .header("Accept", ACCEPT_EITHER);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &self.config.bearer_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()).into())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: JSONRPCRequest) -> Result<JSONRPCResponse> {
        let body = serde_json::to_vec(&request)?;
        let response = self.post(body).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            }
            .into());
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        if content_type.starts_with(APPLICATION_JSON) {
            serde_json::from_str::<JSONRPCResponse>(&body).map_err(|err| {
                TransportError::InvalidMessage(format!("invalid response body: {err}")).into()
            })
        } else if content_type.starts_with(TEXT_EVENT_STREAM) {
            reply_from_event_stream(&body, &request.id)
        } else {
            Err(TransportError::InvalidMessage(format!(
                "unsupported content type: {content_type}"
            ))
            .into())
        }
    }

    async fn notify(&self, notification: JSONRPCNotification) -> Result<()> {
        let body = serde_json::to_vec(&notification)?;
        let response = self.post(body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        }
        .into())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "http"
    }
}

/// Scan a buffered SSE body for the response matching `id`. Only the
/// `data:` payload matters; records with unparseable payloads or foreign
/// ids are skipped.
fn reply_from_event_stream(body: &str, id: &RequestId) -> Result<JSONRPCResponse> {
    let mut parser = SseParser::new();
    let mut events = parser.feed(body);
    events.extend(parser.finish());

    let want = id.key();
    for event in events {
        match serde_json::from_str::<JSONRPCResponse>(&event.data) {
            Ok(response) if response.id.key() == want => return Ok(response),
            Ok(response) => {
                debug!(got = %response.id, "skipping event-stream response for another request");
            },
            Err(err) => debug!(%err, "skipping unparseable event-stream record"),
        }
    }
    Err(TransportError::InvalidMessage("no matching response in event stream".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_stream_matches_by_id_key() {
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":\"string-id\"}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"number-id\"}\n\n",
        );

        // Integer 1 must not match the string-"1" record.
        let response = reply_from_event_stream(body, &RequestId::from(1)).unwrap();
        assert_eq!(response.result(), Some(&json!("number-id")));

        let response = reply_from_event_stream(body, &RequestId::from("1")).unwrap();
        assert_eq!(response.result(), Some(&json!("string-id")));
    }

    #[test]
    fn event_stream_skips_garbage_records() {
        let body = concat!(
            "data: not json\n\n",
            ": comment\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n",
        );
        let response = reply_from_event_stream(body, &RequestId::from(7)).unwrap();
        assert_eq!(response.result(), Some(&json!({"ok": true})));
    }

    #[test]
    fn event_stream_ignores_event_field_tags() {
        // `event:` lines are carried but never filter a record; only the
        // data payload's id decides.
        let body = concat!(
            "event: result\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":5,\"result\":\"tagged\"}\n\n",
        );
        let response = reply_from_event_stream(body, &RequestId::from(5)).unwrap();
        assert_eq!(response.result(), Some(&json!("tagged")));
    }

    #[test]
    fn event_stream_without_match_errors() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":null}\n\n";
        let err = reply_from_event_stream(body, &RequestId::from(3)).unwrap_err();
        assert!(err.to_string().contains("no matching response"));
    }

    #[test]
    fn event_stream_tolerates_missing_trailing_blank_line() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":4,\"result\":\"tail\"}";
        let response = reply_from_event_stream(body, &RequestId::from(4)).unwrap();
        assert_eq!(response.result(), Some(&json!("tail")));
    }
}

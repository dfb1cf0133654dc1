use anyhow::{Context, Result};
use coral_shared::protocol::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult,
};
use coral_shared::{AgentConnectParams, CoralError, CoralTool, SessionCoordinates};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::sse::SseEvent;
use crate::transport::{resolve_endpoint, SseTransport};

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, CoralError>>>>>;

#[derive(Debug, Clone, Copy)]
pub struct McpTimeouts {
    /// How long to wait for the `endpoint` event after connecting.
    pub endpoint: Duration,
    pub request: Duration,
}

impl Default for McpTimeouts {
    fn default() -> Self {
        Self {
            endpoint: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

/// MCP client session over Coral's SSE transport. Requests are POSTed to the
/// message endpoint; responses come back on the SSE stream and are matched to
/// callers by JSON-RPC id.
pub struct McpSession {
    transport: SseTransport,
    message_url: String,
    transport_session_id: String,
    pending: Pending,
    next_id: AtomicI64,
    timeouts: McpTimeouts,
    router: Option<JoinHandle<()>>,
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if let Some(handle) = self.router.take() {
            handle.abort();
        }
    }
}

impl McpSession {
    const MAX_PENDING_REQUESTS: usize = 100;

    pub async fn connect(
        coords: &SessionCoordinates,
        params: &AgentConnectParams,
        timeouts: McpTimeouts,
    ) -> Result<Self> {
        let mut transport = SseTransport::connect(coords, params).await?;
        let endpoint = transport.wait_for("endpoint", timeouts.endpoint).await?;
        let transport_session_id = crate::transport::endpoint_session_id(&endpoint.data)
            .with_context(|| format!("endpoint event carried no sessionId: '{}'", endpoint.data))?;
        let message_url = resolve_endpoint(&coords.origin(), &endpoint.data)?;
        info!(session = %transport_session_id, url = %message_url, "Transport session established");

        let mut session = Self {
            message_url,
            transport_session_id,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(1),
            timeouts,
            router: None,
            transport,
        };
        session.start_response_router();
        session.initialize().await?;
        Ok(session)
    }

    #[must_use]
    pub fn transport_session_id(&self) -> &str {
        &self.transport_session_id
    }

    #[must_use]
    pub fn message_url(&self) -> &str {
        &self.message_url
    }

    fn start_response_router(&mut self) {
        let events = self.transport.take_events();
        let pending = self.pending.clone();
        self.router = Some(tokio::spawn(route_responses(events, pending)));
    }

    async fn post(&self, request: &JsonRpcRequest) -> Result<()> {
        let (status, body) = self.transport.post_json(&self.message_url, request).await?;
        if !(200..300).contains(&status) {
            anyhow::bail!("POST {} returned {status}: {body}", self.message_url);
        }
        Ok(())
    }

    async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            if map.len() >= Self::MAX_PENDING_REQUESTS {
                anyhow::bail!(
                    "MCP pending request limit reached ({})",
                    Self::MAX_PENDING_REQUESTS
                );
            }
            map.insert(id, tx);
        }

        if let Err(e) = self.post(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        if let Ok(res) = tokio::time::timeout(timeout, rx).await {
            Ok(res.context("Response channel closed")??)
        } else {
            self.pending.lock().await.remove(&id);
            Err(CoralError::Timeout(format!("{method} after {timeout:?}")).into())
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, self.timeouts.request)
            .await
    }

    async fn initialize(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.call("initialize", Some(params)).await?;
        info!("MCP Initialized: {}", result);

        let notify = JsonRpcRequest::notification("notifications/initialized", None);
        self.post(&notify)
            .await
            .context("Failed to send initialized notification")
    }

    pub async fn list_tools(&self) -> Result<ListToolsResult> {
        let val = self.call("tools/list", None).await?;
        Ok(serde_json::from_value(val)?)
    }

    pub async fn call_tool(&self, tool: CoralTool, args: Value) -> Result<CallToolResult> {
        self.call_tool_with_timeout(tool, args, self.timeouts.request)
            .await
    }

    async fn call_tool_with_timeout(
        &self,
        tool: CoralTool,
        args: Value,
        timeout: Duration,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: tool.to_string(),
            arguments: args,
        };
        let val = self
            .call_with_timeout("tools/call", Some(serde_json::to_value(params)?), timeout)
            .await?;
        let result: CallToolResult = serde_json::from_value(val)?;
        if result.is_error() {
            anyhow::bail!("{tool} failed: {}", result.text());
        }
        Ok(result)
    }

    pub async fn list_agents(&self, include_details: bool) -> Result<String> {
        let result = self
            .call_tool(
                CoralTool::ListAgents,
                json!({ "includeDetails": include_details }),
            )
            .await?;
        Ok(result.text())
    }

    pub async fn register_agent(&self, name: &str, description: &str) -> Result<String> {
        let result = self
            .call_tool(
                CoralTool::RegisterAgent,
                json!({ "name": name, "description": description }),
            )
            .await?;
        Ok(result.text())
    }

    pub async fn create_thread(&self, name: &str, participants: &[String]) -> Result<String> {
        let result = self
            .call_tool(
                CoralTool::CreateThread,
                json!({ "threadName": name, "participantIds": participants }),
            )
            .await?;
        Ok(result.text())
    }

    pub async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
        mentions: &[String],
    ) -> Result<String> {
        let result = self
            .call_tool(
                CoralTool::SendMessage,
                json!({ "threadId": thread_id, "content": content, "mentions": mentions }),
            )
            .await?;
        Ok(result.text())
    }

    /// Blocks server-side for up to `timeout_ms`; the request timeout is
    /// stretched to cover it.
    pub async fn wait_for_mentions(&self, timeout_ms: u64) -> Result<String> {
        let timeout = self
            .timeouts
            .request
            .max(Duration::from_millis(timeout_ms) + Duration::from_secs(5));
        let result = self
            .call_tool_with_timeout(
                CoralTool::WaitForMentions,
                json!({ "timeoutMs": timeout_ms }),
                timeout,
            )
            .await?;
        Ok(result.text())
    }
}

/// Deliver JSON-RPC responses from the SSE stream to their waiting callers.
/// When the stream closes every outstanding request fails.
async fn route_responses(mut events: mpsc::Receiver<SseEvent>, pending: Pending) {
    while let Some(event) = events.recv().await {
        route_event(&event, &pending).await;
    }

    error!("MCP SSE stream closed.");
    let mut map = pending.lock().await;
    let count = map.len();
    for (id, tx) in map.drain() {
        if tx
            .send(Err(CoralError::Network("SSE stream closed".to_string())))
            .is_err()
        {
            debug!("Response receiver dropped for request {}", id);
        }
    }
    if count > 0 {
        error!("Failed {} pending MCP requests due to stream closure", count);
    }
}

/// Returns true when the event answered a pending request.
async fn route_event(event: &SseEvent, pending: &Pending) -> bool {
    if event.event != "message" {
        debug!(event = %event.event, "Ignoring non-message SSE event");
        return false;
    }
    let Ok(raw) = serde_json::from_str::<Value>(&event.data) else {
        debug!("Received non-JSON message: {}", event.data);
        return false;
    };
    if raw.get("method").is_some() {
        debug!("Received server request or notification: {}", event.data);
        return false;
    }
    let Ok(response) = serde_json::from_value::<JsonRpcResponse>(raw) else {
        debug!("Received non-response message: {}", event.data);
        return false;
    };
    let Some(id) = response.numeric_id() else {
        debug!("Response without a usable id: {}", event.data);
        return false;
    };
    let Some(tx) = pending.lock().await.remove(&id) else {
        debug!("No pending request for response id {}", id);
        return false;
    };
    if tx.send(response.into_result()).is_err() {
        debug!("Response receiver dropped for request {}", id);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(data: &str) -> SseEvent {
        SseEvent {
            event: "message".to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[tokio::test]
    async fn test_route_event_delivers_result_by_id() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(3, tx);

        let routed = route_event(
            &message(r#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#),
            &pending,
        )
        .await;
        assert!(routed);
        assert_eq!(rx.await.unwrap().unwrap(), json!({ "ok": true }));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_route_event_maps_rpc_error() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        route_event(
            &message(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#),
            &pending,
        )
        .await;
        match rx.await.unwrap() {
            Err(CoralError::Rpc { code, .. }) => assert_eq!(code, -32601),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_event_ignores_unrelated_frames() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, _rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        let endpoint = SseEvent {
            event: "endpoint".to_string(),
            data: "/m?sessionId=x".to_string(),
            id: None,
        };
        assert!(!route_event(&endpoint, &pending).await);
        assert!(!route_event(&message("not json"), &pending).await);
        assert!(
            !route_event(&message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#), &pending).await
        );
        assert!(!route_event(&message(r#"{"jsonrpc":"2.0","id":99,"result":{}}"#), &pending).await);
        assert_eq!(pending.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_close_fails_pending() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(5, tx);

        let (events_tx, events_rx) = mpsc::channel(1);
        drop(events_tx);
        route_responses(events_rx, pending.clone()).await;

        assert!(matches!(rx.await.unwrap(), Err(CoralError::Network(_))));
    }
}

use anyhow::{Context, Result};
use coral_shared::{AgentConnectParams, CoralError, SessionCoordinates};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::sse::{SseDecoder, SseEvent};

const EVENT_BUFFER: usize = 100;

/// `sessionId` query parameter of an `endpoint` event's data. The data may be
/// a path (`/app/key/session/message?sessionId=..`) or a full URL.
pub fn endpoint_session_id(data: &str) -> Option<String> {
    let base = Url::parse("http://endpoint.invalid/").ok()?;
    let url = base.join(data.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "sessionId")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Absolute message URL for an `endpoint` event, joined against the server origin.
pub fn resolve_endpoint(origin: &str, data: &str) -> Result<String, CoralError> {
    let base = Url::parse(origin)
        .map_err(|e| CoralError::Config(format!("Invalid origin '{origin}': {e}")))?;
    base.join(data.trim())
        .map(|u| u.to_string())
        .map_err(|e| CoralError::Protocol(format!("Invalid endpoint '{data}': {e}")))
}

/// A live SSE connection to one Coral session. A reader task decodes frames
/// and forwards them; dropping the transport closes the connection.
pub struct SseTransport {
    client: reqwest::Client,
    events: mpsc::Receiver<SseEvent>,
    reader: JoinHandle<()>,
    sse_url: String,
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl SseTransport {
    pub async fn connect(coords: &SessionCoordinates, params: &AgentConnectParams) -> Result<Self> {
        let sse_url = coords.sse_url(params)?;
        Self::connect_url(sse_url).await
    }

    pub async fn connect_url(sse_url: String) -> Result<Self> {
        info!(url = %sse_url, "Opening SSE connection");
        // No overall timeout: the stream stays open for the session's lifetime.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let resp = client
            .get(&sse_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to connect to {sse_url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("SSE connection failed: {status}: {body}");
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "SSE stream read error");
                        break;
                    }
                };
                for event in decoder.push(&chunk) {
                    debug!(event = %event.event, data = %event.data, "SSE event");
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            warn!("SSE stream closed");
        });

        Ok(Self {
            client,
            events: rx,
            reader,
            sse_url,
        })
    }

    #[must_use]
    pub fn sse_url(&self) -> &str {
        &self.sse_url
    }

    /// Next event, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<SseEvent> {
        self.events.recv().await
    }

    /// Hand the event stream to a separate task (e.g. a response router).
    pub fn take_events(&mut self) -> mpsc::Receiver<SseEvent> {
        let (_tx, empty) = mpsc::channel(1);
        std::mem::replace(&mut self.events, empty)
    }

    /// Skip events until one named `name` arrives.
    pub async fn wait_for(&mut self, name: &str, timeout: Duration) -> Result<SseEvent> {
        let wait = async {
            while let Some(event) = self.recv().await {
                if event.event == name {
                    return Ok(event);
                }
                debug!(event = %event.event, "Skipping SSE event while waiting for '{}'", name);
            }
            Err(anyhow::anyhow!("SSE stream closed before '{name}' event"))
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("Timed out after {:?} waiting for '{name}' event", timeout))?
    }

    /// Wait for the `endpoint` event and return the transport session id.
    pub async fn wait_for_session_id(&mut self, timeout: Duration) -> Result<String> {
        let event = self.wait_for("endpoint", timeout).await?;
        endpoint_session_id(&event.data).with_context(|| {
            format!("endpoint event carried no sessionId: '{}'", event.data)
        })
    }

    /// POST a JSON body. Returns the status code and the raw response body.
    pub async fn post_json<B: serde::Serialize>(&self, url: &str, body: &B) -> Result<(u16, String)> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to POST {url}"))?;
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

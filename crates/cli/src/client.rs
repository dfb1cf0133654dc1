use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::CliConfig;

/// Read-only client for a running `coral_monitor`.
pub struct MonitorClient {
    client: Client,
    base_url: String,
}

impl MonitorClient {
    pub fn new(config: &CliConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.monitor_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET request returning deserialized JSON.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .context("Failed to connect to Coral monitor")?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or_default();
            let msg = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            anyhow::bail!("{status}: {msg}");
        }

        resp.json::<T>().await.context("Failed to parse response")
    }

    pub async fn get_stats(&self) -> Result<Value> {
        self.get("/api/stats").await
    }

    pub async fn check_coral_server(&self) -> Result<Value> {
        self.get("/api/check-coral-server").await
    }

    pub async fn get_version(&self) -> Result<Value> {
        self.get("/api/system/version").await
    }

    pub async fn get_messages(&self, thread_id: Option<&str>, limit: usize) -> Result<Vec<Value>> {
        let mut path = format!("/api/messages?limit={limit}");
        if let Some(thread_id) = thread_id {
            let encoded: String = url::form_urlencoded::byte_serialize(thread_id.as_bytes()).collect();
            path.push_str("&thread_id=");
            path.push_str(&encoded);
        }
        self.get(&path).await
    }

    /// GET SSE stream (raw response for incremental decoding).
    pub async fn sse_stream(&self) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(self.url("/api/events"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .context("Failed to connect to SSE stream")?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("SSE connection failed: {body}");
        }

        Ok(resp)
    }
}

use async_trait::async_trait;
use coral_shared::{CoralError, CoralResult, SessionCoordinates};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// REST resources exposed under a dev-mode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Agents,
    Threads,
    Messages,
}

impl Resource {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Resource::Agents => "agents",
            Resource::Threads => "threads",
            Resource::Messages => "messages",
        }
    }
}

/// Result of `GET /api/check-coral-server`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CoralCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub message: String,
    pub url: String,
}

/// Where the monitor reads Coral state from.
#[async_trait]
pub trait CoralSource: Send + Sync {
    fn endpoint(&self, resource: Resource) -> String;

    /// Fetch one resource. Bodies that are not JSON come back as
    /// `Value::String` so the normalizer can treat them as bare ids.
    async fn fetch(&self, resource: Resource) -> CoralResult<Value>;

    /// Reachability check against the agents endpoint. Never fails.
    async fn check(&self) -> CoralCheck;
}

pub struct HttpCoralSource {
    client: reqwest::Client,
    coords: SessionCoordinates,
}

impl HttpCoralSource {
    pub fn new(coords: SessionCoordinates, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coral-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, coords })
    }

    async fn get(&self, url: &str) -> CoralResult<(u16, String)> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CoralError::Timeout(format!("GET {url}"))
            } else {
                CoralError::Network(format!("GET {url}: {e}"))
            }
        })?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| CoralError::Network(format!("Failed to read body from {url}: {e}")))?;
        Ok((status, body))
    }
}

/// JSON body, or the raw text when it is not JSON.
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[async_trait]
impl CoralSource for HttpCoralSource {
    fn endpoint(&self, resource: Resource) -> String {
        self.coords.rest_url(resource.path())
    }

    async fn fetch(&self, resource: Resource) -> CoralResult<Value> {
        let url = self.endpoint(resource);
        let (status, body) = self.get(&url).await?;
        if !(200..300).contains(&status) {
            return Err(CoralError::Network(format!(
                "GET {url} returned {status}: {body}"
            )));
        }
        debug!(resource = resource.path(), bytes = body.len(), "Fetched Coral resource");
        Ok(parse_body(&body))
    }

    async fn check(&self) -> CoralCheck {
        let url = self.endpoint(Resource::Agents);
        match self.get(&url).await {
            Ok((200, _)) => CoralCheck {
                status: "success".to_string(),
                status_code: Some(200),
                message: "Coral server is accessible".to_string(),
                url,
            },
            Ok((code, body)) => CoralCheck {
                status: "error".to_string(),
                status_code: Some(code),
                message: format!("Error: {body}"),
                url,
            },
            Err(e) => {
                tracing::error!(error = %e, "Error checking Coral server");
                CoralCheck {
                    status: "error".to_string(),
                    status_code: None,
                    message: format!("Error: {e}"),
                    url,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_falls_back_to_string() {
        assert_eq!(parse_body(r#"[{"agentId":"a"}]"#), json!([{"agentId": "a"}]));
        assert_eq!(parse_body("agent-1"), json!("agent-1"));
        assert_eq!(parse_body(""), json!(""));
    }

    #[test]
    fn test_endpoint_uses_session_base() {
        let coords = SessionCoordinates::new("http://localhost:5555", "app", "key", "s1")
            .with_devmode(true);
        let source = HttpCoralSource::new(coords, Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.endpoint(Resource::Threads),
            "http://localhost:5555/devmode/app/key/s1/threads"
        );
    }

    #[tokio::test]
    async fn test_check_reports_unreachable_server() {
        // Port 9 (discard) on loopback is expected to refuse connections.
        let coords = SessionCoordinates::new("http://127.0.0.1:9", "app", "key", "s1");
        let source = HttpCoralSource::new(coords, Duration::from_secs(2)).unwrap();
        let check = source.check().await;
        assert_eq!(check.status, "error");
        assert_eq!(check.status_code, None);
        assert!(check.url.ends_with("/app/key/s1/agents"));
    }
}

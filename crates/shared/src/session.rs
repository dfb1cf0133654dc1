use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CoralError, CoralResult};

/// Identifies one Coral session: which server, which application, and which
/// session id all requests are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCoordinates {
    /// Bare host (`localhost:3001`) or a full URL (`https://coral.example`).
    pub server: String,
    pub application_id: String,
    pub privacy_key: String,
    pub session_id: String,
    /// Route through the `/devmode` prefix, which creates sessions on demand.
    #[serde(default)]
    pub devmode: bool,
    /// Force `http://` for bare hosts that are not local.
    #[serde(default)]
    pub plain_http: bool,
}

/// Query parameters sent when opening an agent's SSE connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConnectParams {
    pub agent_id: String,
    pub agent_description: Option<String>,
    pub wait_for_agents: Option<u32>,
}

impl AgentConnectParams {
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.agent_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn wait_for_agents(mut self, count: u32) -> Self {
        self.wait_for_agents = Some(count);
        self
    }
}

impl SessionCoordinates {
    pub fn new(
        server: impl Into<String>,
        application_id: impl Into<String>,
        privacy_key: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            application_id: application_id.into(),
            privacy_key: privacy_key.into(),
            session_id: session_id.into(),
            devmode: false,
            plain_http: false,
        }
    }

    #[must_use]
    pub fn with_devmode(mut self, devmode: bool) -> Self {
        self.devmode = devmode;
        self
    }

    #[must_use]
    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// `scheme://host[:port]` with no trailing slash.
    pub fn origin(&self) -> String {
        let server = self.server.trim().trim_end_matches('/');
        if server.contains("://") {
            return server.to_string();
        }
        let local = server.starts_with("localhost") || server.starts_with("127.");
        let scheme = if self.plain_http || local { "http" } else { "https" };
        format!("{scheme}://{server}")
    }

    /// Session-scoped base: `{origin}[/devmode]/{app}/{key}/{session}`.
    pub fn base_url(&self) -> String {
        let prefix = if self.devmode { "/devmode" } else { "" };
        format!(
            "{}{}/{}/{}/{}",
            self.origin(),
            prefix,
            self.application_id,
            self.privacy_key,
            self.session_id
        )
    }

    pub fn sse_url(&self, params: &AgentConnectParams) -> CoralResult<String> {
        let mut url = self.parse(&format!("{}/sse", self.base_url()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(count) = params.wait_for_agents {
                query.append_pair("waitForAgents", &count.to_string());
            }
            query.append_pair("agentId", &params.agent_id);
            if let Some(ref description) = params.agent_description {
                query.append_pair("agentDescription", description);
            }
        }
        Ok(url.to_string())
    }

    pub fn message_url(&self, transport_session_id: &str) -> CoralResult<String> {
        let mut url = self.parse(&format!("{}/message", self.base_url()))?;
        url.query_pairs_mut()
            .append_pair("sessionId", transport_session_id);
        Ok(url.to_string())
    }

    /// REST resource under the session base, e.g. `agents`, `threads`, `messages`.
    pub fn rest_url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url(), resource.trim_start_matches('/'))
    }

    fn parse(&self, raw: &str) -> CoralResult<Url> {
        Url::parse(raw).map_err(|e| CoralError::Config(format!("Invalid Coral URL '{raw}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(server: &str) -> SessionCoordinates {
        SessionCoordinates::new(server, "default-app", "public", "session1")
    }

    #[test]
    fn test_localhost_defaults_to_http() {
        assert_eq!(coords("localhost:3001").origin(), "http://localhost:3001");
        assert_eq!(coords("127.0.0.1:5555").origin(), "http://127.0.0.1:5555");
    }

    #[test]
    fn test_remote_host_defaults_to_https() {
        assert_eq!(
            coords("coral.pushcollective.club").origin(),
            "https://coral.pushcollective.club"
        );
        assert_eq!(
            coords("coral.pushcollective.club:5555")
                .with_plain_http(true)
                .origin(),
            "http://coral.pushcollective.club:5555"
        );
    }

    #[test]
    fn test_full_url_is_kept() {
        let c = coords("http://coral.pushcollective.club:5555/");
        assert_eq!(c.origin(), "http://coral.pushcollective.club:5555");
    }

    #[test]
    fn test_base_url_with_devmode() {
        let c = coords("localhost:5555").with_devmode(true);
        assert_eq!(
            c.base_url(),
            "http://localhost:5555/devmode/default-app/public/session1"
        );
        assert_eq!(
            c.rest_url("agents"),
            "http://localhost:5555/devmode/default-app/public/session1/agents"
        );
    }

    #[test]
    fn test_sse_url_encodes_agent_params() {
        let c = coords("localhost:5555").with_devmode(true);
        let params = AgentConnectParams::new("test_agent")
            .description("Test agent for connection verification")
            .wait_for_agents(1);
        let url = c.sse_url(&params).unwrap();
        assert_eq!(
            url,
            "http://localhost:5555/devmode/default-app/public/session1/sse?waitForAgents=1&agentId=test_agent&agentDescription=Test+agent+for+connection+verification"
        );
    }

    #[test]
    fn test_message_url() {
        let c = coords("localhost:3001");
        assert_eq!(
            c.message_url("abc-123").unwrap(),
            "http://localhost:3001/default-app/public/session1/message?sessionId=abc-123"
        );
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::CoralError;

// ============================================================
// JSON-RPC 2.0 Types
// ============================================================

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<JsonRpcError> for CoralError {
    fn from(err: JsonRpcError) -> Self {
        CoralError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }

    /// `tool_call` convention: `{"method":"tool_call","params":{"tool","args"}}`
    /// with a UUID string id. The server acknowledges with HTTP 202.
    pub fn tool_call(tool: CoralTool, args: Value) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "tool_call",
            Some(serde_json::json!({ "tool": tool.as_str(), "args": args })),
        )
    }
}

impl JsonRpcResponse {
    /// Numeric id if the server echoed one; string ids holding digits also count.
    pub fn numeric_id(&self) -> Option<i64> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Value, CoralError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

// ============================================================
// MCP Standard Types
// ============================================================

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {},
            client_info: ClientInfo {
                name: crate::CLIENT_NAME.to_string(),
                version: crate::SDK_VERSION.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    pub is_error: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "resource")]
    Resource { resource: Value },
}

impl CallToolResult {
    /// Concatenated text parts, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

// ============================================================
// Coral Tools
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoralTool {
    RegisterAgent,
    ListAgents,
    CreateThread,
    AddParticipant,
    RemoveParticipant,
    CloseThread,
    SendMessage,
    WaitForMentions,
}

impl CoralTool {
    pub const ALL: [CoralTool; 8] = [
        CoralTool::RegisterAgent,
        CoralTool::ListAgents,
        CoralTool::CreateThread,
        CoralTool::AddParticipant,
        CoralTool::RemoveParticipant,
        CoralTool::CloseThread,
        CoralTool::SendMessage,
        CoralTool::WaitForMentions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoralTool::RegisterAgent => "register_agent",
            CoralTool::ListAgents => "list_agents",
            CoralTool::CreateThread => "create_thread",
            CoralTool::AddParticipant => "add_participant",
            CoralTool::RemoveParticipant => "remove_participant",
            CoralTool::CloseThread => "close_thread",
            CoralTool::SendMessage => "send_message",
            CoralTool::WaitForMentions => "wait_for_mentions",
        }
    }
}

impl fmt::Display for CoralTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoralTool {
    type Err = CoralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoralError::Protocol(format!("Unknown Coral tool: {s}")))
    }
}

// ============================================================
// Legacy envelope
// ============================================================

/// Pre-JSON-RPC envelope POSTed to the session base URL.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LegacyToolCall {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: CoralTool,
    pub args: Value,
}

impl LegacyToolCall {
    pub fn new(tool: CoralTool, args: Value) -> Self {
        Self {
            kind: "tool_call".to_string(),
            tool,
            args,
        }
    }
}

/// Reply pushed on the SSE stream for a [`LegacyToolCall`].
#[derive(Debug, Deserialize, Clone)]
pub struct LegacyToolResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: Option<String>,
    #[serde(default)]
    pub result: Value,
}

impl LegacyToolResponse {
    pub fn parse(data: &str) -> Option<Self> {
        let resp: Self = serde_json::from_str(data).ok()?;
        (resp.kind == "tool_response").then_some(resp)
    }

    pub fn is_for(&self, tool: CoralTool) -> bool {
        self.tool.as_deref() == Some(tool.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names_round_trip_through_from_str() {
        for tool in CoralTool::ALL {
            assert_eq!(tool.as_str().parse::<CoralTool>().unwrap(), tool);
        }
        assert!("delete_everything".parse::<CoralTool>().is_err());
    }

    #[test]
    fn test_tool_call_request_shape() {
        let req = JsonRpcRequest::tool_call(
            CoralTool::RegisterAgent,
            json!({"name": "TestAgent", "description": "A test agent"}),
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "tool_call");
        assert_eq!(value["params"]["tool"], "register_agent");
        assert_eq!(value["params"]["args"]["name"], "TestAgent");
        let id = value["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_notification_omits_id() {
        let req = JsonRpcRequest::notification("notifications/initialized", None);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("id").is_none());
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_initialize_params_are_camel_case() {
        let value = serde_json::to_value(InitializeParams::default()).unwrap();
        assert_eq!(value["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(value["clientInfo"]["name"], crate::CLIENT_NAME);
    }

    #[test]
    fn test_response_error_maps_to_rpc_error() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "7",
            "error": {"code": -32602, "message": "Invalid params"}
        }))
        .unwrap();
        assert_eq!(resp.numeric_id(), Some(7));
        match resp.into_result() {
            Err(CoralError::Rpc { code, .. }) => assert_eq!(code, -32602),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_call_tool_result_text_joins_text_parts() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Agents:"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "- alpha"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.text(), "Agents:\n- alpha");
        assert!(!result.is_error());
    }

    #[test]
    fn test_legacy_envelope() {
        let call = LegacyToolCall::new(CoralTool::CreateThread, json!({"participants": ["a"]}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["tool"], "create_thread");

        let resp = LegacyToolResponse::parse(
            r#"{"type":"tool_response","tool":"register_agent","result":{"agent_id":"a1"}}"#,
        )
        .unwrap();
        assert!(resp.is_for(CoralTool::RegisterAgent));
        assert_eq!(resp.result["agent_id"], "a1");
        assert!(LegacyToolResponse::parse(r#"{"type":"ping"}"#).is_none());
        assert!(LegacyToolResponse::parse("not json").is_none());
    }
}

use anyhow::{Context, Result};
use colored::Colorize;
use coral_shared::protocol::{LegacyToolCall, LegacyToolResponse};
use coral_shared::{CoralTool, SessionCoordinates};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::output;
use crate::sse::SseEvent;
use crate::transport::SseTransport;

/// The reply for `tool`, if this event carries one.
pub fn match_tool_response(event: &SseEvent, tool: CoralTool) -> Option<LegacyToolResponse> {
    LegacyToolResponse::parse(&event.data).filter(|resp| resp.is_for(tool))
}

async fn wait_for_response(
    transport: &mut SseTransport,
    tool: CoralTool,
    timeout: Duration,
) -> Result<LegacyToolResponse> {
    let wait = async {
        while let Some(event) = transport.recv().await {
            if let Some(resp) = match_tool_response(&event, tool) {
                return Ok(resp);
            }
            debug!(event = %event.event, data = %event.data, "Unmatched SSE event");
        }
        Err(anyhow::anyhow!("SSE stream closed before {tool} response"))
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| anyhow::anyhow!("Timed out after {:?} waiting for {tool} response", timeout))?
}

async fn send(transport: &SseTransport, url: &str, call: &LegacyToolCall) -> Result<Value> {
    let (status, body) = transport.post_json(url, call).await?;
    if !(200..300).contains(&status) {
        anyhow::bail!("{} returned HTTP {status}: {body}", call.tool);
    }
    Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}

/// Legacy envelope: calls go to the session base URL, replies come back on
/// the SSE stream as `tool_response` events.
pub async fn run(coords: &SessionCoordinates, name: &str, timeout_secs: u64, json_mode: bool) -> Result<()> {
    let timeout = Duration::from_secs(timeout_secs);
    let base_url = coords.base_url();

    let sp = output::maybe_spinner(json_mode, "Connecting to SSE endpoint...");
    let mut transport = SseTransport::connect_url(format!("{base_url}/sse")).await?;

    if let Some(sp) = &sp {
        sp.set_message("Registering agent...");
    }
    let register = LegacyToolCall::new(
        CoralTool::RegisterAgent,
        json!({
            "name": name,
            "description": "A test agent for verifying server functionality"
        }),
    );
    let register_ack = send(&transport, &base_url, &register).await?;
    let registered = wait_for_response(&mut transport, CoralTool::RegisterAgent, timeout).await?;
    let agent_id = registered
        .result
        .get("agent_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("register_agent response carried no agent_id")?;

    if let Some(sp) = &sp {
        sp.set_message("Creating a thread...");
    }
    let create = LegacyToolCall::new(
        CoralTool::CreateThread,
        json!({
            "participants": [agent_id],
            "metadata": { "topic": "Test thread" }
        }),
    );
    let create_ack = send(&transport, &base_url, &create).await?;
    let created = wait_for_response(&mut transport, CoralTool::CreateThread, timeout)
        .await
        .map(|r| r.result);
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    if json_mode {
        let data = json!({
            "base_url": base_url,
            "register_agent": { "ack": register_ack, "result": registered.result },
            "agent_id": agent_id,
            "create_thread": {
                "ack": create_ack,
                "result": created.as_ref().ok(),
                "error": created.as_ref().err().map(|e| e.to_string()),
            },
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        output::print_header("Coral Legacy Envelope");
        output::field("Base URL", &base_url);
        output::ok(&format!("Registered agent with ID: {}", agent_id.bold()));
        match &created {
            Ok(result) => {
                output::ok("Created thread");
                println!("      {}", result.to_string().dimmed());
            }
            Err(e) => output::fail(&format!("create_thread: {e}")),
        }
        println!();
    }

    created.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event: "message".to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_matches_register_response() {
        let resp = match_tool_response(
            &event(r#"{"type":"tool_response","tool":"register_agent","result":{"agent_id":"agent-7"}}"#),
            CoralTool::RegisterAgent,
        )
        .unwrap();
        assert_eq!(resp.result["agent_id"], "agent-7");
    }

    #[test]
    fn test_ignores_other_tools_and_frames() {
        let other = event(r#"{"type":"tool_response","tool":"create_thread","result":{}}"#);
        assert!(match_tool_response(&other, CoralTool::RegisterAgent).is_none());
        assert!(match_tool_response(&event(r#"{"type":"ping"}"#), CoralTool::RegisterAgent).is_none());
        assert!(match_tool_response(&event("hello"), CoralTool::RegisterAgent).is_none());
    }
}

use anyhow::Result;
use colored::Colorize;
use coral_shared::protocol::JsonRpcRequest;
use coral_shared::{AgentConnectParams, CoralTool, SessionCoordinates};
use serde_json::{json, Value};
use std::time::Duration;

use crate::output;
use crate::transport::SseTransport;

const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPTED: u16 = 202;

/// JSON-RPC `tool_call` convention: a 202 on the message endpoint means the
/// server took the request.
pub async fn run(coords: &SessionCoordinates, agent: &str, json_mode: bool) -> Result<()> {
    let params = AgentConnectParams::new(agent);

    let sp = output::maybe_spinner(json_mode, "Connecting to SSE endpoint...");
    let mut transport = SseTransport::connect(coords, &params).await?;
    if let Some(sp) = &sp {
        sp.set_message("Waiting for transport session ID...");
    }
    let session_id = transport.wait_for_session_id(ENDPOINT_TIMEOUT).await?;
    let message_url = coords.message_url(&session_id)?;

    let request = JsonRpcRequest::tool_call(
        CoralTool::RegisterAgent,
        json!({
            "name": "TestAgent",
            "description": "A test agent for verifying server functionality"
        }),
    );
    if let Some(sp) = &sp {
        sp.set_message("Registering agent...");
    }
    let (status, body) = transport.post_json(&message_url, &request).await?;
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    let accepted = status == ACCEPTED;
    let response = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

    if json_mode {
        let data = json!({
            "sse_url": transport.sse_url(),
            "transport_session_id": session_id,
            "message_url": message_url,
            "request": request,
            "status": status,
            "accepted": accepted,
            "response": response,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        output::print_header("Coral Probe (JSON-RPC tool_call)");
        output::field("SSE URL", transport.sse_url());
        output::field("Session", &session_id);
        output::field("Message URL", &message_url);
        output::field("Status", status);
        if !response.is_null() && response != Value::String(String::new()) {
            output::field("Response", output::preview(&response.to_string(), 120).dimmed());
        }
        println!();
        if accepted {
            output::ok("Successfully sent register_agent request");
        } else {
            output::fail("Failed to register agent");
        }
        println!();
    }

    if !accepted {
        anyhow::bail!("register_agent was not accepted (HTTP {status}, expected {ACCEPTED})");
    }
    Ok(())
}

use anyhow::Result;
use colored::Colorize;
use coral_shared::{AgentConnectParams, SessionCoordinates};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::mcp::{McpSession, McpTimeouts};
use crate::output;

pub struct ConnectOptions {
    pub agent: String,
    pub description: String,
    pub wait_for_agents: Option<u32>,
    pub thread: String,
    pub message: Option<String>,
}

/// Thread id out of a `create_thread` reply: a JSON object, or an `ID:` line.
fn extract_thread_id(text: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        return ["threadId", "id"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);
    }
    text.lines()
        .find_map(|line| line.trim().strip_prefix("ID:"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Outcome of one step; failures are reported, not propagated.
fn step(result: Result<String>) -> (bool, String) {
    match result {
        Ok(text) => (true, text),
        Err(e) => (false, format!("{e:#}")),
    }
}

pub async fn run(coords: &SessionCoordinates, opts: &ConnectOptions, json_mode: bool) -> Result<()> {
    let mut params = AgentConnectParams::new(&opts.agent).description(&opts.description);
    let mut timeouts = McpTimeouts::default();
    if let Some(count) = opts.wait_for_agents {
        params = params.wait_for_agents(count);
        // The server holds the endpoint event until enough agents joined.
        timeouts.endpoint = Duration::from_secs(120);
    }

    let sp = output::maybe_spinner(json_mode, "Connecting to Coral server (MCP)...");
    let session = McpSession::connect(coords, &params, timeouts).await?;

    let tools = match session.list_tools().await {
        Ok(list) => list.tools.into_iter().map(|t| t.name).collect::<Vec<_>>(),
        Err(e) => {
            warn!(error = %e, "tools/list failed");
            Vec::new()
        }
    };
    if let Some(sp) = &sp {
        sp.set_message("Listing agents...");
    }
    let agents = step(session.list_agents(true).await);
    if let Some(sp) = &sp {
        sp.set_message("Creating a thread...");
    }
    let thread = step(
        session
            .create_thread(&opts.thread, std::slice::from_ref(&opts.agent))
            .await,
    );
    let sent = match (&opts.message, thread.0) {
        (Some(content), true) => {
            if let Some(sp) = &sp {
                sp.set_message("Sending message...");
            }
            Some(match extract_thread_id(&thread.1) {
                Some(id) => step(session.send_message(&id, content, &[]).await),
                None => (false, "thread id not found in create_thread reply".to_string()),
            })
        }
        _ => None,
    };
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    if json_mode {
        let data = json!({
            "transport_session_id": session.transport_session_id(),
            "message_url": session.message_url(),
            "tools": tools,
            "list_agents": { "ok": agents.0, "result": agents.1 },
            "create_thread": { "ok": thread.0, "result": thread.1 },
            "send_message": sent.as_ref().map(|(ok, result)| json!({ "ok": ok, "result": result })),
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        output::print_header("Coral Connect (MCP)");
        output::field("Session", session.transport_session_id());
        output::field("Message URL", session.message_url());
        output::field("Tools", if tools.is_empty() { "-".to_string() } else { tools.join(", ") });
        println!();
        let mut steps = vec![("list_agents", &agents), ("create_thread", &thread)];
        if let Some(sent) = &sent {
            steps.push(("send_message", sent));
        }
        for (label, (ok, text)) in steps {
            if *ok {
                output::ok(label);
                for line in text.lines() {
                    println!("      {}", line.dimmed());
                }
            } else {
                output::fail(&format!("{label}: {text}"));
            }
        }
        println!();
    }

    let sent_ok = !matches!(sent, Some((false, _)));
    if !(agents.0 && thread.0 && sent_ok) {
        anyhow::bail!("Connection test completed with failures");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_thread_id_from_json() {
        assert_eq!(
            extract_thread_id(r#"{"threadId":"t-9","name":"x"}"#).as_deref(),
            Some("t-9")
        );
        assert_eq!(extract_thread_id(r#"{"id":"t-1"}"#).as_deref(), Some("t-1"));
    }

    #[test]
    fn test_extract_thread_id_from_text() {
        let reply = "Thread created successfully:\n  ID: abc-123\n  Name: Test Thread";
        assert_eq!(extract_thread_id(reply).as_deref(), Some("abc-123"));
        assert_eq!(extract_thread_id("no id here"), None);
    }
}

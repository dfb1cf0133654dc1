use anyhow::Result;
use colored::Colorize;
use coral_shared::{AgentConnectParams, SessionCoordinates};
use serde_json::json;

use crate::mcp::{McpSession, McpTimeouts};
use crate::output;

pub async fn run(
    coords: &SessionCoordinates,
    agent: &str,
    timeout_ms: u64,
    rounds: u32,
    json_mode: bool,
) -> Result<()> {
    let params = AgentConnectParams::new(agent).description("Waits for mentions");
    let session = McpSession::connect(coords, &params, McpTimeouts::default()).await?;
    let registered = session
        .register_agent(agent, "Connection test agent waiting for mentions")
        .await?;

    if json_mode {
        println!(
            "{}",
            json!({ "event": "registered", "agent": agent, "result": registered })
        );
    } else {
        output::print_header("Waiting for Mentions");
        output::field("Agent", agent.bold());
        output::field("Session", session.transport_session_id());
        output::field("Per round", format!("{timeout_ms} ms"));
        println!("  {} Press {} to stop", "ℹ".dimmed(), "Ctrl+C".bold());
        println!();
    }

    let mut round: u32 = 0;
    loop {
        round += 1;
        let result = tokio::select! {
            r = session.wait_for_mentions(timeout_ms) => r?,
            _ = tokio::signal::ctrl_c() => break,
        };

        if json_mode {
            println!("{}", json!({ "event": "mentions", "round": round, "result": result }));
        } else {
            let ts = chrono::Local::now().format("%H:%M:%S").to_string();
            if result.trim().is_empty() {
                println!("  {} {}", ts.dimmed(), "no mentions".dimmed());
            } else {
                println!("  {} {}", ts.dimmed(), "[mention]".cyan());
                for line in result.lines() {
                    println!("      {line}");
                }
            }
        }

        if rounds != 0 && round >= rounds {
            break;
        }
    }
    Ok(())
}

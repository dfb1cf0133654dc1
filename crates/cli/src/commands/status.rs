use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::client::MonitorClient;
use crate::output;

pub async fn run(client: &MonitorClient, json_mode: bool) -> Result<()> {
    let sp = output::maybe_spinner(json_mode, "Fetching monitor status...");

    let stats = client.get_stats().await?;
    let check = client.check_coral_server().await?;
    let version = client.get_version().await.unwrap_or(Value::Null);

    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    if json_mode {
        let data = serde_json::json!({
            "endpoint": client.base_url(),
            "monitor": version,
            "coral": check,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let count = |key: &str| stats.get(key).and_then(Value::as_i64).unwrap_or(0);
    let coral_status = check.get("status").and_then(Value::as_str).unwrap_or("error");

    output::print_header("Coral Monitor Status");
    output::field(
        "Monitor",
        format!(
            "v{} ({})",
            version.get("version").and_then(Value::as_str).unwrap_or("?"),
            client.base_url()
        ),
    );
    output::field(
        "Coral",
        format!(
            "{} {} {}",
            output::status_dot(coral_status),
            check.get("url").and_then(Value::as_str).unwrap_or("-"),
            check
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .dimmed()
        ),
    );
    if let Some(session) = version.get("session_id").and_then(Value::as_str) {
        output::field("Session", session);
    }
    output::field("Agents", count("agent_count"));
    output::field("Threads", count("thread_count"));
    output::field(
        "Messages",
        format!(
            "{} ({} in the last hour)",
            count("message_count"),
            format!("{}", count("recent_activity")).green()
        ),
    );
    if let Some(types) = stats.get("message_types").and_then(Value::as_object) {
        let breakdown = types
            .iter()
            .map(|(t, n)| format!("{t}={n}"))
            .collect::<Vec<_>>()
            .join(", ");
        if !breakdown.is_empty() {
            output::field("Types", breakdown.dimmed());
        }
    }
    println!();

    Ok(())
}

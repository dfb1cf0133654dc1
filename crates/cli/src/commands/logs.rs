use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use serde_json::Value;

use crate::client::MonitorClient;
use crate::output;
use crate::sse::{SseDecoder, SseEvent};

pub async fn run(
    client: &MonitorClient,
    follow: bool,
    limit: usize,
    thread: Option<&str>,
    json_mode: bool,
) -> Result<()> {
    if follow {
        follow_stream(client, thread, json_mode).await
    } else {
        show_messages(client, limit, thread, json_mode).await
    }
}

/// Mirrored messages, oldest first.
async fn show_messages(
    client: &MonitorClient,
    limit: usize,
    thread: Option<&str>,
    json_mode: bool,
) -> Result<()> {
    let sp = output::maybe_spinner(json_mode, "Loading messages...");
    let mut messages = client.get_messages(thread, limit).await?;
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    // Without a thread the monitor returns newest first.
    if thread.is_none() {
        messages.reverse();
    }

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    match thread {
        Some(t) => output::print_header(&format!("Thread {t}")),
        None => output::print_header("Mirrored Messages"),
    }
    output::print_messages_table(&messages);
    println!();
    if messages.len() >= limit {
        println!(
            "  {} Showing the latest {limit}. Use {} to see more.",
            "ℹ".dimmed(),
            "--limit N".dimmed(),
        );
        println!();
    }
    Ok(())
}

/// Follow the monitor's event stream and print updates in real-time.
async fn follow_stream(client: &MonitorClient, thread: Option<&str>, json_mode: bool) -> Result<()> {
    if !json_mode {
        output::print_header("Live Monitor Events");
        println!("  {} Press {} to stop", "ℹ".dimmed(), "Ctrl+C".bold());
        println!();
    }

    let response = client
        .sse_stream()
        .await
        .context("Failed to connect to event stream")?;

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Stream read error")?;
        for event in decoder.push(&chunk) {
            if event.event == "handshake" {
                continue;
            }
            let Ok(data) = serde_json::from_str::<Value>(&event.data) else {
                continue;
            };
            if !matches_thread(&event, &data, thread) {
                continue;
            }
            if json_mode {
                println!(
                    "{}",
                    serde_json::json!({ "event": event.event, "data": data })
                );
            } else {
                print_event(&event.event, &data);
            }
        }
    }

    Ok(())
}

fn matches_thread(event: &SseEvent, data: &Value, thread: Option<&str>) -> bool {
    match thread {
        None => true,
        Some(t) => event.event == "message_update" && data.get("thread_id").and_then(Value::as_str) == Some(t),
    }
}

fn count(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Format and print a single monitor event with color coding.
fn print_event(name: &str, data: &Value) {
    let timestamp = data
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map_or_else(
            || chrono::Local::now().format("%H:%M:%S").to_string(),
            |dt| dt.format("%H:%M:%S").to_string(),
        );

    let (tag, detail) = match name {
        "message_update" => {
            let str_of = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("?");
            let target = data
                .get("receiver_id")
                .and_then(Value::as_str)
                .unwrap_or("thread");
            let content = match data.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (
                format!("[{}]", "Message".cyan()),
                format!(
                    "{} {} → {target}: \"{}\"",
                    str_of("thread_id").dimmed(),
                    str_of("sender_id"),
                    output::preview(&content, 60)
                ),
            )
        }
        "agents_update" => (
            format!("[{}]", "Agents".green()),
            format!("{} reported", count(data)),
        ),
        "threads_update" => (
            format!("[{}]", "Threads".magenta()),
            format!("{} reported", count(data)),
        ),
        "messages_update" => (
            format!("[{}]", "Messages".blue()),
            format!("{} in last poll", count(data)),
        ),
        other => (
            format!("[{}]", other.dimmed()),
            output::preview(&data.to_string(), 80).dimmed().to_string(),
        ),
    };

    println!("  {} {:<20} {}", timestamp.dimmed(), tag, detail);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: String::new(),
            id: None,
        }
    }

    #[test]
    fn test_thread_filter_only_passes_matching_messages() {
        let data = json!({ "thread_id": "t-1" });
        assert!(matches_thread(&event("message_update"), &data, Some("t-1")));
        assert!(!matches_thread(&event("message_update"), &data, Some("t-2")));
        assert!(!matches_thread(&event("agents_update"), &data, Some("t-1")));
        assert!(matches_thread(&event("agents_update"), &data, None));
    }

    #[test]
    fn test_count_payload_shapes() {
        assert_eq!(count(&json!([1, 2, 3])), 3);
        assert_eq!(count(&json!({ "id": "a" })), 1);
        assert_eq!(count(&Value::Null), 0);
    }
}

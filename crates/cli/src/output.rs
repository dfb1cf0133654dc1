use colored::Colorize;
use comfy_table::{presets::NOTHING, ContentArrangement, Table};
use serde_json::Value;

/// Print a decorated section header.
pub fn print_header(title: &str) {
    let line = "─".repeat(36);
    println!();
    println!("  {}", title.bold());
    println!("  {}", line.dimmed());
}

/// Label/value line used by every command's human-readable output.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {}", format!("{label}:").dimmed(), value);
}

pub fn ok(msg: &str) {
    println!("  {} {msg}", "✓".green().bold());
}

pub fn fail(msg: &str) {
    println!("  {} {msg}", "✗".red().bold());
}

/// Status dot: ● (success/active, green), ○ otherwise.
pub fn status_dot(status: &str) -> String {
    match status {
        "success" | "active" => "●".green().to_string(),
        _ => "○".dimmed().to_string(),
    }
}

pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Print mirrored messages as a table.
pub fn print_messages_table(messages: &[Value]) {
    if messages.is_empty() {
        println!("  {}", "No messages mirrored.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for m in messages {
        let str_of = |key: &str| m.get(key).and_then(Value::as_str).unwrap_or("-").to_string();
        let receiver = m
            .get("receiver_id")
            .and_then(Value::as_str)
            .map(|r| format!(" → {r}"))
            .unwrap_or_default();
        table.add_row(vec![
            format!("  {}", str_of("timestamp").dimmed()),
            str_of("thread_id").cyan().to_string(),
            format!("{}{receiver}", str_of("sender_id").bold()),
            str_of("type").dimmed().to_string(),
            preview(&content_text(m.get("content").unwrap_or(&Value::Null)), 60),
        ]);
    }

    println!("{table}");
}

/// Create a styled spinner with a message.
pub fn spinner(msg: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("  {spinner} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Spinner in human mode, nothing in `--json` mode.
pub fn maybe_spinner(json_mode: bool, msg: &str) -> Option<indicatif::ProgressBar> {
    (!json_mode).then(|| spinner(msg))
}

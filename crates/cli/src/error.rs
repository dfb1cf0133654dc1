use colored::Colorize;

/// Format an error for CLI display with contextual help messages.
pub fn display_error(err: &anyhow::Error) {
    let msg = format!("{err:#}");

    if msg.contains("Connection refused")
        || msg.contains("error sending request")
        || msg.contains("tcp connect error")
    {
        eprintln!("  {} Cannot connect to the server", "ERROR".red().bold());
        eprintln!(
            "        Check the address with: {}",
            "coral config show".dimmed()
        );
        eprintln!(
            "        Override per run with {} or {}",
            "--server".dimmed(),
            "CORAL_SERVER / CORAL_MONITOR_URL".dimmed()
        );
    } else if msg.contains("endpoint event") {
        eprintln!("  {} {}", "ERROR".red().bold(), err);
        eprintln!(
            "        The server accepted the SSE connection but never announced a message endpoint."
        );
        eprintln!(
            "        Check the application id and privacy key, or toggle {}.",
            "--devmode".dimmed()
        );
    } else {
        eprintln!("  {} {}", "ERROR".red().bold(), err);
        for cause in err.chain().skip(1) {
            eprintln!("        {} {cause}", "caused by:".dimmed());
        }
    }
}

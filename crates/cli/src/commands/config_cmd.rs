use anyhow::Result;
use colored::Colorize;

use crate::cli::ConfigCommand;
use crate::config::CliConfig;

const ENV_OVERRIDES: &[&str] = &[
    "CORAL_SERVER",
    "CORAL_APP",
    "CORAL_KEY",
    "CORAL_SESSION",
    "CORAL_MONITOR_URL",
];

pub fn run(cmd: ConfigCommand, config: &CliConfig, json_mode: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(config, json_mode),
        ConfigCommand::Set { key, value } => set(&key, &value),
        ConfigCommand::Path => {
            println!("{}", CliConfig::path()?.display());
            Ok(())
        }
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

fn show(config: &CliConfig, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let path = CliConfig::path()?;

    println!();
    println!("  {}", "Configuration".bold());
    println!("  {}", "─".repeat(36).dimmed());
    println!("  {}            {}", "file:".dimmed(), path.display());
    println!("  {}          {}", "server:".dimmed(), config.server);
    println!("  {}  {}", "application_id:".dimmed(), config.application_id);
    println!("  {}     {}", "privacy_key:".dimmed(), mask(&config.privacy_key).dimmed());
    println!("  {}      {}", "session_id:".dimmed(), config.session_id);
    println!("  {}         {}", "devmode:".dimmed(), config.devmode);
    println!("  {}     {}", "monitor_url:".dimmed(), config.monitor_url);
    println!();

    for var in ENV_OVERRIDES {
        if std::env::var(var).is_ok() {
            println!("  {} {var} environment variable is active", "ℹ".blue());
        }
    }

    Ok(())
}

fn set(key: &str, value: &str) -> Result<()> {
    CliConfig::set(key, value)?;

    println!(
        "  {} {key} = {}",
        "✓".green().bold(),
        if key == "privacy_key" {
            "***".to_string()
        } else {
            value.to_string()
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("privkey"), "***");
        assert_eq!(mask("abcd1234efgh"), "abcd...efgh");
    }
}

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "coral_monitor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Coral Monitor - passive mirror and dashboard for a Coral session"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitor (default when no subcommand is given)
    Serve,
    /// Check whether the configured Coral server is reachable, then exit
    Check,
    /// Run a single polling round against the configured database, then exit
    PollOnce,
    /// Print version and configuration summary
    Version,
}

pub async fn dispatch(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Serve => crate::run_monitor().await,
        Commands::Check => {
            let config = AppConfig::load()?;
            let source = crate::coral::HttpCoralSource::new(
                config.coral.clone(),
                config.request_timeout(),
            )?;
            let check = crate::coral::CoralSource::check(&source).await;
            println!("{}", serde_json::to_string_pretty(&check)?);
            if check.status != "success" {
                anyhow::bail!("Coral server check failed: {}", check.message);
            }
            Ok(())
        }
        Commands::PollOnce => {
            let config = AppConfig::load()?;
            let pool = crate::connect_pool(&config.database_url).await?;
            let source = Arc::new(crate::coral::HttpCoralSource::new(
                config.coral.clone(),
                config.request_timeout(),
            )?);
            let (tx, _rx) = tokio::sync::broadcast::channel(config.event_channel_capacity);
            let monitor = crate::monitor::Monitor::new(source, pool, tx, config.polling_interval());
            let summary = monitor.poll_once().await;
            info!(?summary, "Polling round finished");
            println!(
                "agents={} threads={} new_messages={}",
                fmt_count(summary.agents),
                fmt_count(summary.threads),
                fmt_count(summary.new_messages)
            );
            Ok(())
        }
        Commands::Version => {
            let config = AppConfig::load()?;
            println!("coral_monitor {}", env!("CARGO_PKG_VERSION"));
            println!("  coral server : {}", config.coral.origin());
            println!("  session base : {}", config.coral.base_url());
            println!("  database     : {}", config.database_url);
            Ok(())
        }
    }
}

fn fmt_count(count: Option<usize>) -> String {
    count.map_or_else(|| "failed".to_string(), |n| n.to_string())
}

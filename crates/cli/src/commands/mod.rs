pub mod config_cmd;
pub mod connect;
pub mod legacy;
pub mod logs;
pub mod mentions;
pub mod probe;
pub mod status;

use anyhow::Result;
use coral_shared::SessionCoordinates;

use crate::cli::{Cli, Commands, SessionArgs};
use crate::client::MonitorClient;
use crate::config::CliConfig;

/// Command-line flags over config file (and its env overrides).
pub fn resolve_session(args: &SessionArgs, config: &CliConfig) -> SessionCoordinates {
    let devmode = if args.devmode {
        true
    } else if args.no_devmode {
        false
    } else {
        config.devmode
    };
    SessionCoordinates::new(
        args.server.clone().unwrap_or_else(|| config.server.clone()),
        args.app
            .clone()
            .unwrap_or_else(|| config.application_id.clone()),
        args.key.clone().unwrap_or_else(|| config.privacy_key.clone()),
        args.session
            .clone()
            .unwrap_or_else(|| config.session_id.clone()),
    )
    .with_devmode(devmode)
    .with_plain_http(args.http)
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = CliConfig::load()?;

    match cli.command {
        Commands::Probe { session, agent } => {
            let coords = resolve_session(&session, &config);
            probe::run(&coords, &agent, cli.json).await
        }
        Commands::Connect {
            session,
            agent,
            description,
            wait_for_agents,
            thread,
            message,
        } => {
            let coords = resolve_session(&session, &config);
            let opts = connect::ConnectOptions {
                agent,
                description,
                wait_for_agents,
                thread,
                message,
            };
            connect::run(&coords, &opts, cli.json).await
        }
        Commands::Legacy {
            session,
            name,
            timeout,
        } => {
            let coords = resolve_session(&session, &config);
            legacy::run(&coords, &name, timeout, cli.json).await
        }
        Commands::Mentions {
            session,
            agent,
            timeout_ms,
            rounds,
        } => {
            let coords = resolve_session(&session, &config);
            mentions::run(&coords, &agent, timeout_ms, rounds, cli.json).await
        }
        Commands::Status => status::run(&MonitorClient::new(&config), cli.json).await,
        Commands::Logs {
            follow,
            limit,
            thread,
        } => {
            let client = MonitorClient::new(&config);
            logs::run(&client, follow, limit, thread.as_deref(), cli.json).await
        }
        Commands::Config(cmd) => config_cmd::run(cmd, &config, cli.json),
    }
}

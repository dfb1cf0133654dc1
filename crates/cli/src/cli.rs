use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "coral",
    about = "Coral - connection tests and tool-call examples for a Coral server",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Output raw JSON (for scripting/piping)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Session coordinates; anything omitted comes from `coral config`.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Server host (`localhost:5555`) or full URL
    #[arg(long)]
    pub server: Option<String>,
    /// Application id
    #[arg(long)]
    pub app: Option<String>,
    /// Privacy key
    #[arg(long)]
    pub key: Option<String>,
    /// Session id
    #[arg(long)]
    pub session: Option<String>,
    /// Force plain HTTP for a bare host
    #[arg(long)]
    pub http: bool,
    /// Use dev-mode endpoints
    #[arg(long, conflicts_with = "no_devmode")]
    pub devmode: bool,
    /// Use production endpoints
    #[arg(long)]
    pub no_devmode: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an agent over the JSON-RPC `tool_call` convention and expect HTTP 202
    Probe {
        #[command(flatten)]
        session: SessionArgs,
        /// Agent id to connect as
        #[arg(long, default_value = "test-agent")]
        agent: String,
    },

    /// Connect over MCP, list agents and create a test thread
    Connect {
        #[command(flatten)]
        session: SessionArgs,
        /// Agent id to connect as
        #[arg(long, default_value = "test_agent")]
        agent: String,
        /// Agent description announced on connect
        #[arg(long, default_value = "Test agent for connection verification")]
        description: String,
        /// Ask the server to hold the connection until this many agents joined
        #[arg(long)]
        wait_for_agents: Option<u32>,
        /// Name of the thread to create
        #[arg(long, default_value = "Test Thread")]
        thread: String,
        /// Post this message to the new thread
        #[arg(long)]
        message: Option<String>,
    },

    /// Register and create a thread with the legacy `{"type":"tool_call"}` envelope
    Legacy {
        #[command(flatten)]
        session: SessionArgs,
        /// Name sent with register_agent
        #[arg(long, default_value = "TestAgent")]
        name: String,
        /// Seconds to wait for each `tool_response`
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Register over MCP and wait for mentions
    Mentions {
        #[command(flatten)]
        session: SessionArgs,
        /// Agent id to connect as
        #[arg(long, default_value = "listener_agent")]
        agent: String,
        /// Server-side wait per round, in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,
        /// Number of wait rounds (0 = until interrupted)
        #[arg(long, default_value = "1")]
        rounds: u32,
    },

    /// Show the monitor's mirror statistics and Coral reachability
    Status,

    /// Show mirrored messages from the monitor
    Logs {
        /// Follow mode: stream monitor events in real-time
        #[arg(short, long)]
        follow: bool,
        /// Limit number of messages
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only this thread
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Manage CLI configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key name (server, application_id, privacy_key, session_id, devmode, monitor_url)
        key: String,
        /// Value to set
        value: String,
    },
    /// Print the config file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_probe_flags() {
        let cli = Cli::parse_from(["coral", "probe", "--server", "localhost:3001", "--http", "--devmode"]);
        match cli.command {
            Commands::Probe { session, agent } => {
                assert_eq!(session.server.as_deref(), Some("localhost:3001"));
                assert!(session.http);
                assert!(session.devmode);
                assert_eq!(agent, "test-agent");
            }
            _ => panic!("expected probe"),
        }
    }

    #[test]
    fn test_logs_defaults() {
        let cli = Cli::parse_from(["coral", "--json", "logs", "-t", "t-1"]);
        assert!(cli.json);
        match cli.command {
            Commands::Logs { follow, limit, thread } => {
                assert!(!follow);
                assert_eq!(limit, 20);
                assert_eq!(thread.as_deref(), Some("t-1"));
            }
            _ => panic!("expected logs"),
        }
    }
}

//! Clap derive structures for the `pipewatch` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pipewatch -- watch and drive database replication pipelines
#[derive(Debug, Parser)]
#[command(
    name = "pipewatch",
    version,
    about = "Watch and manage replication pipelines from the command line",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Dashboard API base URL (overrides the config file)
    #[arg(long, short = 'u', env = "PIPEWATCH_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Keyring profile holding the session
    #[arg(long, short = 'p', env = "PIPEWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "PIPEWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PIPEWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the backend is up
    Health,

    /// Log in and store the session in the keyring
    Login(LoginArgs),

    /// Drop the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Manage source and target connections
    #[command(alias = "conn", alias = "c")]
    Connections(ConnectionsArgs),

    /// Manage replication pipelines
    #[command(alias = "pl")]
    Pipelines(PipelinesArgs),

    /// Browse replication events and metrics
    #[command(alias = "ev")]
    Events(EventsArgs),

    /// Stream live events for one or more pipelines
    Watch(WatchArgs),

    /// Inspect and edit the configuration file
    Config(ConfigArgs),
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Username (defaults to the configured one)
    pub username: Option<String>,

    /// Read the password from stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,
}

// ── Paging ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Args)]
pub struct PageArgs {
    /// Entries to skip
    #[arg(long, default_value = "0")]
    pub skip: u32,

    /// Maximum entries to return
    #[arg(long, short = 'l', default_value = "100")]
    pub limit: u32,
}

// ── Connections ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConnectionsArgs {
    #[command(subcommand)]
    pub command: ConnectionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConnectionsCommand {
    /// List connections
    #[command(alias = "ls")]
    List(PageArgs),

    /// Show one connection
    Get { id: String },

    /// Create a connection from a JSON file
    Create {
        /// JSON body
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Update a connection from a JSON file
    Update {
        id: String,
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Delete a connection
    #[command(alias = "rm")]
    Delete { id: String },

    /// Run the server-side connectivity test
    Test { id: String },

    /// List tables visible through a connection
    Tables { id: String },

    /// Show the first rows of a table
    Preview {
        id: String,
        table: String,
        /// Rows to fetch
        #[arg(long, short = 'l', default_value = "20")]
        limit: u32,
    },
}

// ── Pipelines ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PipelinesArgs {
    #[command(subcommand)]
    pub command: PipelinesCommand,
}

#[derive(Debug, Subcommand)]
pub enum PipelinesCommand {
    /// List pipelines
    #[command(alias = "ls")]
    List(PageArgs),

    /// Show one pipeline
    Get { id: String },

    /// Create a pipeline from a JSON file
    Create {
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Update a pipeline from a JSON file
    Update {
        id: String,
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Delete a pipeline
    #[command(alias = "rm")]
    Delete { id: String },

    /// Start a run
    Trigger { id: String },

    /// Pause a running pipeline
    Pause { id: String },

    /// Stop a pipeline
    Stop { id: String },

    /// Print the pipeline definition as JSON
    Export { id: String },
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub command: EventsCommand,
}

#[derive(Debug, Subcommand)]
pub enum EventsCommand {
    /// List recent replication events
    #[command(alias = "ls")]
    List {
        /// Only events of this pipeline
        #[arg(long)]
        pipeline: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },

    /// List monitoring metrics
    Metrics {
        #[arg(long)]
        pipeline: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Pipelines to subscribe to; the first one is the refresh scope
    #[arg(required = true)]
    pub pipelines: Vec<String>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,

    /// Set the dashboard base URL
    SetUrl { url: String },

    /// Remember a username for `login`
    SetUser { username: String },
}

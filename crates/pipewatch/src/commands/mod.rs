//! Command dispatch: bridges CLI args -> dashboard calls -> output formatting.

pub mod auth;
pub mod config_cmd;
pub mod connections;
pub mod events;
pub mod pipelines;
pub mod util;
pub mod watch;

use pipewatch_config::Config;
use pipewatch_core::Dashboard;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    dashboard: &Dashboard,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Health => auth::health(dashboard, global).await,
        Command::Login(args) => auth::login(dashboard, args, config, global).await,
        Command::Logout => auth::logout(dashboard, global).await,
        Command::Whoami => auth::whoami(dashboard, global).await,
        Command::Connections(args) => connections::handle(dashboard, args, global).await,
        Command::Pipelines(args) => pipelines::handle(dashboard, args, global).await,
        Command::Events(args) => events::handle(dashboard, args, global).await,
        Command::Watch(args) => watch::handle(dashboard, &args, global).await,
        // Config is handled before dispatch
        Command::Config(_) => Err(CliError::Usage {
            field: "command".into(),
            reason: "config commands do not need a backend".into(),
        }),
    }
}

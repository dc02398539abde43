//! Config command handlers. These never talk to the backend.

use pipewatch_config::{Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::Loaded;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, loaded: &Loaded, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let out = match global.output {
                OutputFormat::Json => output::render_json(&loaded.config, false)?,
                OutputFormat::JsonCompact => output::render_json(&loaded.config, true)?,
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&loaded.config).map_err(ConfigError::from)?
                }
            };
            output::print_output(out.trim_end(), global.quiet);
        }

        ConfigCommand::Path => {
            output::print_output(&loaded.path.display().to_string(), global.quiet);
        }

        ConfigCommand::SetUrl { url } => {
            // Start from the file so flag overrides are not persisted.
            let mut config = pipewatch_config::load_config_from(&loaded.path)?;
            config.base_url = url.trim_end_matches('/').to_owned();
            save(&config, loaded)?;
            output::print_output(&format!("Base URL set to {}", config.base_url), global.quiet);
        }

        ConfigCommand::SetUser { username } => {
            let username = username.trim().to_owned();
            if username.is_empty() {
                return Err(CliError::Usage {
                    field: "username".into(),
                    reason: "must not be empty".into(),
                });
            }
            let mut config = pipewatch_config::load_config_from(&loaded.path)?;
            config.username = Some(username.clone());
            save(&config, loaded)?;
            output::print_output(&format!("Username set to {username}"), global.quiet);
        }
    }
    Ok(())
}

/// Validate before writing so a bad edit never lands on disk.
fn save(config: &Config, loaded: &Loaded) -> Result<(), CliError> {
    config.to_client_config()?;
    pipewatch_config::save_config_to(config, &loaded.path)?;
    tracing::info!(path = %loaded.path.display(), "config saved");
    Ok(())
}

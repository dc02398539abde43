//! CLI configuration -- thin wrapper around `pipewatch_config`.
//!
//! Applies `GlobalOpts` overrides (--base-url, --profile, --config) on top
//! of the loaded file and builds the `Dashboard`.

use std::path::PathBuf;
use std::sync::Arc;

use pipewatch_config::{Config, KeyringTokenStore};
use pipewatch_core::Dashboard;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Loaded configuration plus the file it came from.
pub struct Loaded {
    pub config: Config,
    pub path: PathBuf,
}

/// Load the config file (or defaults) and apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Loaded, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(pipewatch_config::config_path);
    let mut config = pipewatch_config::load_config_from(&path)?;

    if let Some(ref url) = global.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref profile) = global.profile {
        config.profile.clone_from(profile);
    }
    Ok(Loaded { config, path })
}

/// Build the dashboard service with the keyring session for the active
/// profile.
pub fn build_dashboard(config: &Config) -> Result<Dashboard, CliError> {
    let client_config = config.to_client_config()?;
    let tokens = Arc::new(KeyringTokenStore::new(&config.profile));
    tracing::debug!(
        base_url = %client_config.base_url,
        profile = %config.profile,
        "building dashboard"
    );
    Ok(Dashboard::new(client_config, tokens)?)
}

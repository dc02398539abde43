//! Shared helpers for command handlers.

use std::io::{self, IsTerminal};
use std::path::Path;

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` is required.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read and parse a JSON file for `--file` flags.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Usage {
        field: "file".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn yes_flag_skips_the_prompt() {
        assert!(confirm("Delete pipeline 7?", true).unwrap());
    }

    #[test]
    fn invalid_json_file_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_json_file(&path).unwrap_err();
        assert!(matches!(err, CliError::Usage { ref field, .. } if field == "file"));
    }
}

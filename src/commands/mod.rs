//! Command implementations for locksmith.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the config lookup they share.

mod config_cmd;
mod demo;
mod key;

use crate::cli::{Cli, Command};
use locksmith::config::{Config, DEFAULT_CONFIG_FILE};
use locksmith::error::LockError;
use locksmith::exit_codes;
use std::path::Path;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Key(args) => key::cmd_key(&config, args),
        Command::Demo(args) => demo::cmd_demo(&config, args),
        Command::Config => config_cmd::cmd_config(&config),
    }
}

/// Exit code for a failed command.
///
/// Lock errors carry their own code; anything else is a failure of the
/// guarded work.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<LockError>()
        .map_or(exit_codes::WORK_FAILURE, LockError::exit_code)
}

/// Load the explicit config file, else `./locksmith.yaml` if present, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config, LockError> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                Config::load(default)
            } else {
                tracing::debug!("no config file found, using defaults");
                Ok(Config::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_errors_keep_their_exit_code() {
        let err = anyhow::Error::new(LockError::NotAcquired("busy".to_string()));
        assert_eq!(exit_code_for(&err), exit_codes::LOCK_FAILURE);

        let err = anyhow::Error::new(LockError::Config("bad".to_string())).context("loading");
        assert_eq!(exit_code_for(&err), exit_codes::USER_ERROR);
    }

    #[test]
    fn other_errors_are_work_failures() {
        let err = anyhow::anyhow!("counter invariant violated");
        assert_eq!(exit_code_for(&err), exit_codes::WORK_FAILURE);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = load_config(Some(temp.path().join("missing.yaml").as_path())).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }
}

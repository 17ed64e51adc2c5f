//! Implementation of the `locksmith config` command.

use locksmith::config::Config;

/// Print the effective configuration as YAML.
pub fn cmd_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

//! CLI argument parsing for locksmith.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use locksmith::locks::LockType;
use serde_json::Value;
use std::path::PathBuf;

/// locksmith: run units of work under declared distributed locks.
///
/// Lock declarations name a key template, a lock type and wait/lease
/// timing. The CLI resolves keys against a configuration and runs the
/// bounded-counter demo that shows mutual exclusion at work.
#[derive(Parser, Debug)]
#[command(name = "locksmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (default: ./locksmith.yaml when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for locksmith.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print the lock key for an invocation.
    ///
    /// Without --template, the declaration registered for Type::method in
    /// the config is used, falling back to the default derived key.
    Key(KeyArgs),

    /// Run the bounded-counter scenario.
    ///
    /// Starts N callers together; each makes one guarded update to a shared
    /// counter and the command reports how many succeeded.
    Demo(DemoArgs),

    /// Print the effective configuration as YAML.
    Config,
}

/// Arguments for the `key` command.
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Key template (literal text or `#param.path` placeholders).
    #[arg(short, long)]
    pub template: Option<String>,

    /// Type name of the guarded target.
    #[arg(long = "type")]
    pub type_name: String,

    /// Guarded method name.
    #[arg(short, long)]
    pub method: String,

    /// Named argument as name=value; the value is parsed as JSON, else taken as a string.
    #[arg(short, long = "arg", value_parser = parse_named_arg)]
    pub args: Vec<(String, Value)>,

    /// Pass arguments without their parameter names.
    #[arg(long)]
    pub positional: bool,
}

/// Direction of the demo's counter updates.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoDirection {
    /// Callers decrement; the counter may not go below the floor ("sold out").
    Decrement,
    /// Callers increment; the counter may not exceed the ceiling ("limit exceeded").
    Increment,
}

/// Arguments for the `demo` command.
#[derive(Parser, Debug)]
pub struct DemoArgs {
    pub direction: DemoDirection,

    /// Number of concurrent callers.
    #[arg(long, default_value_t = 20)]
    pub callers: usize,

    /// Initial counter value.
    #[arg(long, default_value_t = 10)]
    pub start: i64,

    /// Lowest value the counter may reach.
    #[arg(long, default_value_t = 0)]
    pub floor: i64,

    /// Highest value the counter may reach.
    #[arg(long, default_value_t = 20)]
    pub ceiling: i64,

    /// Lock type for the guarded update.
    #[arg(long, default_value = "exclusive")]
    pub lock_type: LockType,

    /// Maximum wait for the lock, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    pub wait_ms: u64,

    /// Pause between reading and writing the counter, in milliseconds.
    #[arg(long, default_value_t = 1)]
    pub pause_ms: u64,
}

fn parse_named_arg(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("argument name is empty in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_config() {
        let cli = Cli::try_parse_from(["locksmith", "config"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["locksmith", "config", "-c", "other.yaml", "-vv"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("other.yaml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn parse_key_with_args() {
        let cli = Cli::try_parse_from([
            "locksmith",
            "key",
            "--template",
            "#order.id",
            "--type",
            "OrderService",
            "--method",
            "place",
            "--arg",
            r#"order={"id": 5}"#,
            "--arg",
            "note=hello world",
        ])
        .unwrap();
        let Command::Key(args) = cli.command else {
            panic!("Expected Key command");
        };
        assert_eq!(args.template.as_deref(), Some("#order.id"));
        assert_eq!(args.type_name, "OrderService");
        assert_eq!(args.method, "place");
        assert_eq!(
            args.args,
            vec![
                ("order".to_string(), json!({"id": 5})),
                ("note".to_string(), json!("hello world")),
            ]
        );
        assert!(!args.positional);
    }

    #[test]
    fn parse_key_rejects_arg_without_name() {
        let result = Cli::try_parse_from([
            "locksmith", "key", "--type", "T", "--method", "m", "--arg", "=1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::try_parse_from(["locksmith", "demo", "decrement"]).unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("Expected Demo command");
        };
        assert_eq!(args.direction, DemoDirection::Decrement);
        assert_eq!(args.callers, 20);
        assert_eq!(args.start, 10);
        assert_eq!(args.floor, 0);
        assert_eq!(args.ceiling, 20);
        assert_eq!(args.lock_type, LockType::Exclusive);
        assert_eq!(args.wait_ms, 3000);
    }

    #[test]
    fn parse_demo_lock_type() {
        let cli = Cli::try_parse_from([
            "locksmith",
            "demo",
            "increment",
            "--lock-type",
            "fair",
            "--callers",
            "5",
        ])
        .unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("Expected Demo command");
        };
        assert_eq!(args.direction, DemoDirection::Increment);
        assert_eq!(args.lock_type, LockType::Fair);
        assert_eq!(args.callers, 5);

        assert!(
            Cli::try_parse_from(["locksmith", "demo", "increment", "--lock-type", "mutex"])
                .is_err()
        );
    }
}

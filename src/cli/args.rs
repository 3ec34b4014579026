//! CLI argument definitions using clap
//!
//! Commands:
//! - bucketdb serve --config <path>
//! - bucketdb kv get|set|delete --location <file> --bucket <b> --key <k> [--value <json>]
//! - bucketdb compact --location <file>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Severity;

/// bucketdb - an embedded record store with secondary indexes
#[derive(Parser, Debug)]
#[command(name = "bucketdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity: trace, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Severity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP host until interrupted
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./bucketdb.json")]
        config: PathBuf,
    },

    /// Read or write a raw bucket entry
    Kv {
        #[command(subcommand)]
        action: KvAction,
    },

    /// Rewrite a store file to hold only live data
    Compact {
        /// Path to the store file
        #[arg(long)]
        location: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum KvAction {
    /// Print the JSON value stored under a key
    Get {
        #[command(flatten)]
        target: KvTarget,
    },

    /// Store a JSON value under a key
    Set {
        #[command(flatten)]
        target: KvTarget,

        /// Value as JSON text
        #[arg(long)]
        value: String,
    },

    /// Remove a key
    Delete {
        #[command(flatten)]
        target: KvTarget,
    },
}

#[derive(Args, Debug)]
pub struct KvTarget {
    /// Path to the store file
    #[arg(long)]
    pub location: PathBuf,

    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Key, stored as a JSON string
    #[arg(long)]
    pub key: String,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_kv_set() {
        let cli = Cli::try_parse_from([
            "bucketdb",
            "--log-level",
            "warn",
            "kv",
            "set",
            "--location",
            "/tmp/app.db",
            "--bucket",
            "settings",
            "--key",
            "theme",
            "--value",
            "\"dark\"",
        ])
        .unwrap();

        assert_eq!(cli.log_level, Severity::Warn);
        match cli.command {
            Command::Kv {
                action: KvAction::Set { target, value },
            } => {
                assert_eq!(target.bucket, "settings");
                assert_eq!(target.key, "theme");
                assert_eq!(value, "\"dark\"");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_serve_default_config_path() {
        let cli = Cli::try_parse_from(["bucketdb", "serve"]).unwrap();
        assert_eq!(cli.log_level, Severity::Info);
        assert!(matches!(cli.command, Command::Serve { config } if config == PathBuf::from("./bucketdb.json")));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert!(Cli::try_parse_from(["bucketdb", "--log-level", "loud", "serve"]).is_err());
    }
}

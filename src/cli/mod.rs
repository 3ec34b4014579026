//! CLI module for bucketdb
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP host
//! - kv: One-shot raw bucket get/set/delete
//! - compact: Rewrite a store file

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command, KvAction, KvTarget};
pub use commands::{compact, kv, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};

//! CLI command implementations

use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;

use crate::http_server::{AppConfig, HttpServer};
use crate::observability::Logger;
use crate::store::Store;

use super::args::{Cli, Command, KvAction};
use super::errors::{CliError, CliResult};

/// Main entry point for the CLI
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: Cli) -> CliResult<()> {
    Logger::set_min_severity(cli.log_level);
    match cli.command {
        Command::Serve { config } => serve(&config),
        Command::Kv { action } => kv(action, &mut io::stdout().lock()),
        Command::Compact { location } => compact(&location),
    }
}

/// Run the HTTP host until Ctrl-C, then shut down.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = AppConfig::load(config_path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve_until_interrupted(config))
}

async fn serve_until_interrupted(config: AppConfig) -> CliResult<()> {
    let mut server = HttpServer::new(config);
    server.start().await?;

    let signal = tokio::signal::ctrl_c().await;
    server.shutdown().await;
    signal.map_err(|e| CliError::io_error(format!("failed to wait for Ctrl-C: {}", e)))
}

/// Execute one raw bucket operation. `get` writes the value as JSON to `out`.
pub fn kv<W: Write>(action: KvAction, out: &mut W) -> CliResult<()> {
    match action {
        KvAction::Get { target } => {
            let store = Store::open(&target.location)?;
            let value: Value = store.get_key(&target.bucket, &target.key)?;
            writeln!(out, "{}", value)?;
        }
        KvAction::Set { target, value } => {
            let value: Value = serde_json::from_str(&value)
                .map_err(|e| CliError::invalid_value(format!("--value is not JSON: {}", e)))?;
            let store = Store::open(&target.location)?;
            store.set_key(&target.bucket, &target.key, &value)?;
        }
        KvAction::Delete { target } => {
            let store = Store::open(&target.location)?;
            store.delete_key(&target.bucket, &target.key)?;
        }
    }
    Ok(())
}

/// Rewrite the store file at `location`.
pub fn compact(location: &Path) -> CliResult<()> {
    if !location.exists() {
        return Err(CliError::invalid_value(format!(
            "no store at {}",
            location.display()
        )));
    }
    let store = Store::open(location)?;
    store.compact()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::KvTarget;
    use tempfile::TempDir;

    fn target(dir: &TempDir) -> KvTarget {
        KvTarget {
            location: dir.path().join("app.db"),
            bucket: "settings".into(),
            key: "theme".into(),
        }
    }

    #[test]
    fn test_kv_set_get_delete() {
        let dir = TempDir::new().unwrap();

        kv(
            KvAction::Set {
                target: target(&dir),
                value: r#"{"mode":"dark"}"#.into(),
            },
            &mut io::sink(),
        )
        .unwrap();

        let mut out = Vec::new();
        kv(KvAction::Get { target: target(&dir) }, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"mode\":\"dark\"}\n");

        kv(KvAction::Delete { target: target(&dir) }, &mut io::sink()).unwrap();
        let err = kv(KvAction::Get { target: target(&dir) }, &mut io::sink()).unwrap_err();
        assert!(err.message().contains("BUCKETDB_NOT_FOUND"));
    }

    #[test]
    fn test_kv_set_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let err = kv(
            KvAction::Set {
                target: target(&dir),
                value: "not json".into(),
            },
            &mut io::sink(),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "BUCKETDB_CLI_INVALID_VALUE");
        assert!(!dir.path().join("app.db").exists());
    }

    #[test]
    fn test_compact_missing_store() {
        let dir = TempDir::new().unwrap();
        assert!(compact(&dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_compact_keeps_latest_values() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("app.db");
        {
            let store = Store::open(&location).unwrap();
            for i in 0..10 {
                store.set_key("counters", "hits", &i).unwrap();
            }
        }

        compact(&location).unwrap();

        let store = Store::open(&location).unwrap();
        let hits: i32 = store.get_key("counters", "hits").unwrap();
        assert_eq!(hits, 9);
    }
}

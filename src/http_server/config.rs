//! Host configuration
//!
//! Loaded from a JSON file with camelCase keys:
//!
//! ```json
//! {
//!   "addr": ":8080",
//!   "dbUrl": "/var/lib/app",
//!   "dbUser": "",
//!   "dbPass": "",
//!   "dbName": "app.db",
//!   "shutdownTimeoutSecs": 10,
//!   "corsOrigins": []
//! }
//! ```
//!
//! The embedded store only uses `dbUrl` and `dbName`; the credentials are
//! carried for hosts that need them.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ServerError, ServerResult};

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Bind address; `:PORT` binds every interface (default: ":8080")
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Directory holding the store file; empty means the working directory
    #[serde(default)]
    pub db_url: String,

    #[serde(default)]
    pub db_user: String,

    #[serde(default)]
    pub db_pass: String,

    /// Store file name (default: "bucketdb.db")
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Upper bound on graceful shutdown (default: 10)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_addr() -> String {
    ":8080".to_string()
}

fn default_db_name() -> String {
    "bucketdb.db".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            db_url: String::new(),
            db_user: String::new(),
            db_pass: String::new(),
            db_name: default_db_name(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            cors_origins: Vec::new(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("addr", &self.addr)
            .field("db_url", &self.db_url)
            .field("db_user", &self.db_user)
            .field("db_pass", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("shutdown_timeout_secs", &self.shutdown_timeout_secs)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl AppConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| ServerError::config(format!("invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.socket_addr()?;

        if self.db_name.is_empty() {
            return Err(ServerError::config("dbName must not be empty"));
        }
        if self.db_name.contains(['/', '\\']) {
            return Err(ServerError::config(format!(
                "dbName must be a file name, got '{}'",
                self.db_name
            )));
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ServerError::config("shutdownTimeoutSecs must be > 0"));
        }

        Ok(())
    }

    /// Resolved bind address. `:8080` means `0.0.0.0:8080`.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };
        addr.parse()
            .map_err(|_| ServerError::config(format!("invalid addr '{}'", self.addr)))
    }

    /// Path of the store file.
    pub fn storage_location(&self) -> PathBuf {
        if self.db_url.is_empty() {
            PathBuf::from(&self.db_name)
        } else {
            Path::new(&self.db_url).join(&self.db_name)
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

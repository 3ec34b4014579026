//! Host error types

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::store::StoreError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration file missing, unparsable or invalid
    #[error("config error: {0}")]
    Config(String),

    /// The listener could not be bound
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `start` was called on a running server
    #[error("server is already running")]
    AlreadyStarted,

    /// The store failed to connect
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        ServerError::Config(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "BUCKETDB_SERVER_CONFIG",
            ServerError::Bind { .. } => "BUCKETDB_SERVER_BIND",
            ServerError::AlreadyStarted => "BUCKETDB_SERVER_ALREADY_STARTED",
            ServerError::Store(e) => e.code(),
        }
    }
}

//! Observable events
//!
//! Events are explicit and typed; each maps to a stable event name in the
//! log stream.

use std::fmt;

use super::logger::{Logger, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    StoreConnect,
    StoreTornTailTruncated,
    StoreClose,
    StoreCompact,
    StoreBucketDropped,

    // Host lifecycle
    ServerInitStart,
    ServerListening,
    ServerInitComplete,
    ServerShutdownStart,
    ServerShutdownTimeout,
    ServerShutdownComplete,

    // Requests
    HttpRequest,
    HttpPanic,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreConnect => "STORE_CONNECT",
            Event::StoreTornTailTruncated => "STORE_TORN_TAIL_TRUNCATED",
            Event::StoreClose => "STORE_CLOSE",
            Event::StoreCompact => "STORE_COMPACT",
            Event::StoreBucketDropped => "STORE_BUCKET_DROPPED",
            Event::ServerInitStart => "SERVER_INIT_START",
            Event::ServerListening => "SERVER_LISTENING",
            Event::ServerInitComplete => "SERVER_INIT_COMPLETE",
            Event::ServerShutdownStart => "SERVER_SHUTDOWN_START",
            Event::ServerShutdownTimeout => "SERVER_SHUTDOWN_TIMEOUT",
            Event::ServerShutdownComplete => "SERVER_SHUTDOWN_COMPLETE",
            Event::HttpRequest => "HTTP_REQUEST",
            Event::HttpPanic => "HTTP_PANIC",
        }
    }

    /// Default severity for the event.
    pub fn severity(&self) -> Severity {
        match self {
            Event::StoreTornTailTruncated | Event::ServerShutdownTimeout => Severity::Warn,
            Event::HttpPanic => Severity::Error,
            _ => Severity::Info,
        }
    }

    pub fn emit(self, fields: &[(&str, &str)]) {
        Logger::log(self.severity(), self.as_str(), fields);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

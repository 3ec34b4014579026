//! Observability subsystem for bucketdb
//!
//! Structured JSON line logging for store and host lifecycle events and for
//! HTTP requests.
//!
//! # Usage
//!
//! ```
//! use bucketdb::observability::{Event, Logger, Severity};
//!
//! Logger::set_min_severity(Severity::Warn);
//! Event::StoreConnect.emit(&[("location", "/tmp/app.db")]);
//! Logger::info("CUSTOM_EVENT", &[("rows", "42")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

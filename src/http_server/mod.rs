//! # bucketdb HTTP host
//!
//! Owns the store for the process lifetime: connects it before serving and
//! closes it during shutdown.
//!
//! # Endpoints
//!
//! - `/health` - Health check with store status

mod config;
mod errors;
mod middleware;
mod routes;
mod server;

pub use config::AppConfig;
pub use errors::{ServerError, ServerResult};
pub use middleware::{with_middleware, REQUEST_ID_HEADER};
pub use routes::{health_routes, HealthResponse};
pub use server::HttpServer;

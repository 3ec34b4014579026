//! # HTTP Server
//!
//! Host lifecycle around the store:
//!
//! 1. `start` connects the store, binds and serves in a background task
//! 2. `shutdown` stops accepting, waits a bounded time for in-flight
//!    requests, then closes the store

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::config::AppConfig;
use super::errors::{ServerError, ServerResult};
use super::middleware::with_middleware;
use super::routes::health_routes;
use crate::observability::Event;
use crate::store::Store;

struct Running {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

/// HTTP host owning the store for its lifetime
pub struct HttpServer {
    config: AppConfig,
    store: Arc<Store>,
    running: Option<Running>,
}

impl HttpServer {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(Store::new(config.storage_location()));
        Self {
            config,
            store,
            running: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Build the router with all endpoints and middleware
    pub fn router(&self) -> Router {
        with_middleware(
            Router::new().merge(health_routes(Arc::clone(&self.store))),
            &self.config.cors_origins,
        )
    }

    /// Connects the store and starts serving. Returns the bound address.
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }
        Event::ServerInitStart.emit(&[("addr", &self.config.addr)]);

        let addr = self.config.socket_addr()?;
        self.store.connect()?;

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.store.close();
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                self.store.close();
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_str = local.to_string();
        Event::ServerListening.emit(&[("addr", &local_str)]);

        let router = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        self.running = Some(Running {
            addr: local,
            shutdown_tx,
            task,
        });
        Event::ServerInitComplete.emit(&[("addr", &local_str)]);
        Ok(local)
    }

    /// Stops the server and closes the store. Safe to call when never started.
    pub async fn shutdown(&mut self) {
        let timeout = self.config.shutdown_timeout();
        Event::ServerShutdownStart.emit(&[("timeout_secs", &timeout.as_secs().to_string())]);

        let outcome = match self.running.take() {
            None => "not_running".to_string(),
            Some(running) => {
                let _ = running.shutdown_tx.send(());
                let mut task = running.task;
                match tokio::time::timeout(timeout, &mut task).await {
                    Ok(Ok(Ok(()))) => "graceful".to_string(),
                    Ok(Ok(Err(e))) => format!("serve error: {}", e),
                    Ok(Err(e)) => format!("task failed: {}", e),
                    Err(_) => {
                        Event::ServerShutdownTimeout
                            .emit(&[("timeout_secs", &timeout.as_secs().to_string())]);
                        task.abort();
                        "aborted".to_string()
                    }
                }
            }
        };

        self.store.close();
        Event::ServerShutdownComplete.emit(&[("outcome", &outcome)]);
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

//! HTTP endpoints

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::store::Store;

/// Body of `GET /health`. `store` is `connected` or `closed`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

impl HealthResponse {
    fn for_store(store: &Store) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            store: if store.is_connected() { "connected" } else { "closed" },
        }
    }
}

pub fn health_routes(store: Arc<Store>) -> Router {
    Router::new().route("/health", get(health)).with_state(store)
}

async fn health(State(store): State<Arc<Store>>) -> Json<HealthResponse> {
    Json(HealthResponse::for_store(&store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_tracks_connection() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path().join("health.db")));

        let Json(body) = health(State(Arc::clone(&store))).await;
        assert_eq!(body.store, "closed");

        store.connect().unwrap();
        let Json(body) = health(State(Arc::clone(&store))).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.store, "connected");
        store.close();
    }
}

//! The instance side of the protocol.
//!
//! A registered service exposes `GET /heartbeat` for liveness and
//! `POST /update` to receive dependency changes. `DependencyCache` keeps
//! the merged view of those changes so the service can look up live
//! providers by name.

use crate::types::{Patch, Update};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use svcreg_common::{Error, Result, ServiceName};
use tracing::{debug, warn};

use crate::types::ErrorResponse;

/// Live providers per dependency name.
#[derive(Debug, Clone, Default)]
pub struct DependencyCache {
    entries: Arc<RwLock<HashMap<ServiceName, Vec<Patch>>>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one update: adds first (replacing same identity), then removes.
    pub fn apply(&self, update: &Update) {
        let mut entries = self.entries.write();

        for patch in &update.add {
            let list = entries.entry(patch.name.clone()).or_default();
            list.retain(|p| p.instance_url != patch.instance_url);
            list.push(patch.clone());
        }

        for patch in &update.remove {
            if let Some(list) = entries.get_mut(&patch.name) {
                list.retain(|p| p.instance_url != patch.instance_url);
                if list.is_empty() {
                    entries.remove(&patch.name);
                }
            }
        }
    }

    /// Live instances of `name`.
    pub fn get(&self, name: &str) -> Result<Vec<Patch>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("dependency {}", name)))
    }

    pub fn snapshot(&self) -> HashMap<ServiceName, Vec<Patch>> {
        self.entries.read().clone()
    }
}

/// Router an instance mounts to take part in the registry protocol.
pub fn instance_router(cache: DependencyCache) -> Router {
    Router::new()
        .route("/heartbeat", get(heartbeat_handler))
        .route("/update", post(update_handler))
        .with_state(cache)
}

async fn heartbeat_handler() -> StatusCode {
    StatusCode::OK
}

async fn update_handler(State(cache): State<DependencyCache>, body: Bytes) -> Response {
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            debug!(
                "Dependency update: {} added, {} removed",
                update.add.len(),
                update.remove.len()
            );
            cache.apply(&update);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!("Rejected dependency update: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid update: {}", e),
                }),
            )
                .into_response()
        }
    }
}

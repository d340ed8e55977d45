//! Helpers shared by unit tests: registration builders and a fake
//! instance fleet that records every `Update` it receives.

use crate::types::{Registration, Update};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

pub fn registration(name: &str, instance_url: &str, depends_on: &[&str]) -> Registration {
    Registration::new(
        name,
        instance_url,
        format!("{}/heartbeat", instance_url),
        String::new(),
    )
    .with_dependencies(depends_on.iter().copied())
}

#[derive(Default)]
struct RecorderState {
    received: Mutex<Vec<(String, Update)>>,
    failing: Mutex<HashSet<String>>,
}

/// Serves `POST /:instance/update` for any instance id and records the
/// decoded body per instance.
#[derive(Clone)]
pub struct UpdateRecorder {
    pub addr: SocketAddr,
    state: Arc<RecorderState>,
}

impl UpdateRecorder {
    pub async fn spawn() -> Self {
        let state = Arc::new(RecorderState::default());
        let router = Router::new()
            .route("/:instance/update", post(record))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn update_url(&self, instance: &str) -> String {
        format!("http://{}/{}/update", self.addr, instance)
    }

    /// Registration whose update endpoint points at this recorder.
    pub fn registration(&self, name: &str, instance: &str, depends_on: &[&str]) -> Registration {
        let mut reg = registration(name, &format!("http://{}/{}", self.addr, instance), depends_on);
        reg.update_url = self.update_url(instance);
        reg
    }

    /// Makes `instance` answer 500 from now on.
    pub fn fail(&self, instance: &str) {
        self.state.failing.lock().insert(instance.to_string());
    }

    pub fn received(&self) -> Vec<(String, Update)> {
        self.state.received.lock().clone()
    }

    pub fn received_by(&self, instance: &str) -> Vec<Update> {
        self.received()
            .into_iter()
            .filter(|(who, _)| who == instance)
            .map(|(_, update)| update)
            .collect()
    }

    /// Polls until at least `count` updates arrived or two seconds pass.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, Update)> {
        for _ in 0..200 {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.received()
    }
}

async fn record(
    State(state): State<Arc<RecorderState>>,
    Path(instance): Path<String>,
    Json(update): Json<Update>,
) -> StatusCode {
    state.received.lock().push((instance.clone(), update));
    if state.failing.lock().contains(&instance) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

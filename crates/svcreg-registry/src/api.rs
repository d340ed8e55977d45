//! HTTP API handlers using axum.
//!
//! # Rust Learning Note
//!
//! ## Decoding the body by hand
//!
//! The `Json<T>` extractor answers 422 for bodies that are valid JSON
//! but the wrong shape. Registration clients expect a plain 400 for any
//! undecodable body, so the handlers take raw `Bytes` and decode with
//! `serde_json::from_slice`, mapping every failure to `ApiError::BadRequest`.
//!
//! ## Method handling
//!
//! `get(list).post(register)` on one path makes axum answer 405 for every
//! other method on `/services` without a dedicated fallback.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::{
    notifier::FanoutNotifier,
    storage::RegistrationStore,
    types::{ErrorResponse, Patch, Registration},
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: RegistrationStore,
    pub notifier: FanoutNotifier,
}

impl AppState {
    pub fn new(store: RegistrationStore, notifier: FanoutNotifier) -> Self {
        Self { store, notifier }
    }
}

/// Creates the registry router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/services", get(list_handler).post(register_handler))
        .route("/services/deregister", post(deregister_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Registers (or replaces) an instance.
///
/// Responds once the store write is done; the add fan-out runs in a
/// detached task and its outcome never reaches this response.
async fn register_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let reg: Registration = decode(&body, "registration")?;
    reg.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        "Registration received: {} at {} (depends on: {:?})",
        reg.name, reg.instance_url, reg.depends_on
    );
    state.store.upsert(reg.clone());

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        notifier.notify_add(&reg).await;
    });

    Ok(StatusCode::OK)
}

/// Removes an instance by identity. Idempotent.
async fn deregister_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let patch: Patch = decode(&body, "patch")?;

    match state.store.remove(patch.name.as_str(), &patch.instance_url) {
        Some(removed) => {
            info!("Deregistered {} at {}", removed.name, removed.instance_url);
            let notifier = state.notifier.clone();
            tokio::spawn(async move {
                notifier.notify_remove(&removed).await;
            });
        }
        None => debug!(
            "Deregister of unknown instance {} at {}",
            patch.name, patch.instance_url
        ),
    }

    Ok(StatusCode::OK)
}

/// Returns the full name -> instances mapping.
async fn list_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let body = serde_json::to_vec(&snapshot)
        .map_err(|e| ApiError::Internal(format!("Failed to encode services: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Liveness of the registry itself.
async fn health_handler() -> &'static str {
    "OK"
}

fn decode<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", what, e)))
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("API error: {} - {}", status, message);
        } else {
            debug!("API error: {} - {}", status, message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifyConfig;
    use crate::storage::ServiceMap;
    use crate::test_support::{registration, UpdateRecorder};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt; // for `oneshot`

    fn app(store: &RegistrationStore) -> Router {
        let notifier = FanoutNotifier::new(store.clone(), NotifyConfig::default());
        create_router(AppState::new(store.clone(), notifier))
    }

    fn post_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_endpoint() {
        let store = RegistrationStore::new();
        let reg = registration("log", "http://h1/log", &[]);

        let response = app(&store)
            .oneshot(post_request("/services", serde_json::to_vec(&reg).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.get("log", "http://h1/log"), Some(reg));
    }

    #[tokio::test]
    async fn test_register_rejects_garbage() {
        let store = RegistrationStore::new();

        let response = app(&store)
            .oneshot(post_request("/services", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("Invalid registration"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_register_without_heartbeat_url() {
        let store = RegistrationStore::new();

        let response = app(&store)
            .oneshot(post_request(
                "/services",
                r#"{"ServiceName":"B","ServiceUrl":"http://h2/b","UpdateUrl":"http://h2/update","DependedServicesName":["A"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = store.get("B", "http://h2/b").unwrap();
        assert_eq!(stored.heartbeat_url, "");
        assert!(stored.depends_on.contains("A"));
    }

    #[tokio::test]
    async fn test_register_rejects_wrong_shape_and_empty_fields() {
        let store = RegistrationStore::new();

        let wrong_shape = app(&store)
            .oneshot(post_request("/services", r#"{"ServiceName": 42}"#))
            .await
            .unwrap();
        assert_eq!(wrong_shape.status(), StatusCode::BAD_REQUEST);

        let empty_name = app(&store)
            .oneshot(post_request(
                "/services",
                r#"{"ServiceName": "", "ServiceUrl": "http://h/x", "HeartbeatDetectionUrl": "http://h/hb"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(empty_name.status(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_register_triggers_add_fanout() {
        let fleet = UpdateRecorder::spawn().await;
        let store = RegistrationStore::new();
        let log = fleet.registration("log", "log-1", &[]);
        store.upsert(log.clone());

        let function = fleet.registration("function", "fn-1", &["log"]);
        let response = app(&store)
            .oneshot(post_request("/services", serde_json::to_vec(&function).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let received = fleet.wait_for(1).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "fn-1");
        assert_eq!(received[0].1.add, vec![log.patch()]);
    }

    #[tokio::test]
    async fn test_list_endpoint() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));
        store.upsert(registration("log", "http://h2/log", &[]));
        store.upsert(registration("function", "http://h3/f", &["log"]));

        let response = app(&store)
            .oneshot(Request::builder().uri("/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let services: ServiceMap = serde_json::from_slice(&body).unwrap();
        assert_eq!(services, store.snapshot());
        assert_eq!(services["log"].len(), 2);
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let store = RegistrationStore::new();

        for method in ["PUT", "DELETE", "PATCH"] {
            let response = app(&store)
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/services")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        }
    }

    #[tokio::test]
    async fn test_deregister_endpoint() {
        let fleet = UpdateRecorder::spawn().await;
        let store = RegistrationStore::new();
        let log = fleet.registration("log", "log-1", &[]);
        store.upsert(log.clone());
        store.upsert(fleet.registration("function", "fn-1", &["log"]));

        let body = serde_json::to_vec(&log.patch()).unwrap();
        let response = app(&store)
            .oneshot(post_request("/services/deregister", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get("log", &log.instance_url).is_none());

        let received = fleet.wait_for(1).await;
        assert_eq!(received[0].1.remove, vec![log.patch()]);

        // second call is a no-op
        let again = app(&store)
            .oneshot(post_request("/services/deregister", body))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let store = RegistrationStore::new();
        let response = app(&store)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

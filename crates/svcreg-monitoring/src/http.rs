// HTTP heartbeat check implementation

use crate::{HealthCheckData, ProbeError, ProbeResult};
use chrono::Utc;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Pooled client used for heartbeat GETs.
pub type HttpClient = Client<HttpConnector, Empty<Bytes>>;

/// Builds a heartbeat client (HTTP/1, keep-alive pooling).
pub fn new_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Single heartbeat check configuration
#[derive(Debug, Clone)]
pub struct HttpCheckConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub expected_status: Vec<u16>,
}

impl HttpCheckConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(2),
            expected_status: vec![200],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_status(mut self, status_codes: Vec<u16>) -> Self {
        self.expected_status = status_codes;
        self
    }
}

/// Performs one GET against a heartbeat endpoint.
///
/// Returns `Ok` whenever the instance answered, with `is_healthy` set from
/// the status code. Transport failures, timeouts and unparsable URLs are
/// errors.
pub async fn check_http_health(
    client: &HttpClient,
    config: &HttpCheckConfig,
) -> ProbeResult<HealthCheckData> {
    let start = Instant::now();

    let uri: Uri = config
        .endpoint
        .parse()
        .map_err(|e| ProbeError::InvalidUrl {
            endpoint: config.endpoint.clone(),
            reason: format!("{}", e),
        })?;

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("User-Agent", "svcreg-heartbeat/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::InvalidUrl {
            endpoint: config.endpoint.clone(),
            reason: format!("Failed to build request: {}", e),
        })?;

    let response = match timeout(config.timeout, client.request(request)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return Err(ProbeError::ConnectionFailed {
                endpoint: config.endpoint.clone(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                endpoint: config.endpoint.clone(),
            })
        }
    };

    let status = response.status();
    let elapsed = start.elapsed().as_millis() as u64;
    let is_healthy = config.expected_status.contains(&status.as_u16());

    debug!(
        "Heartbeat check complete: {} - status={} healthy={} time={}ms",
        config.endpoint, status, is_healthy, elapsed
    );

    Ok(HealthCheckData {
        is_healthy,
        status_code: status.as_u16(),
        checked_at: Utc::now(),
        response_time_ms: elapsed,
        error_message: if is_healthy {
            None
        } else {
            Some(format!("Unexpected status code: {}", status))
        },
    })
}

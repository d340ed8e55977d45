//! Outbound JSON over HTTP.
//!
//! Both the fan-out notifier and the registry client speak JSON over a
//! pooled hyper client. Every call is wrapped in a hard timeout so a hung
//! peer can only cost one timeout per request.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use svcreg_common::{Error, Result};
use tokio::time::timeout;
use tracing::debug;

/// Pooled HTTP/1 client carrying fully-buffered JSON bodies.
pub type JsonClient = Client<HttpConnector, Full<Bytes>>;

pub fn new_json_client() -> JsonClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// POSTs `body` as JSON and returns the response status.
///
/// Any status is returned as `Ok`; only transport failures and timeouts
/// are errors. The response body is drained and discarded.
pub async fn post_json<T: Serialize + ?Sized>(
    client: &JsonClient,
    url: &str,
    body: &T,
    request_timeout: Duration,
) -> Result<StatusCode> {
    let payload = serde_json::to_vec(body)?;
    let request = build_request(Method::POST, url, Bytes::from(payload))?;

    let response = send(client, url, request, request_timeout).await?;
    let status = response.status();
    debug!("POST {} -> {}", url, status);

    // Read the body to the end so the connection goes back to the pool.
    match timeout(request_timeout, response.into_body().collect()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("Discarding unreadable response body from {}: {}", url, e),
        Err(_) => debug!("Timed out draining response body from {}", url),
    }

    Ok(status)
}

/// GETs `url` and decodes a JSON body; non-2xx is `Error::Registry`.
pub async fn get_json<T: DeserializeOwned>(
    client: &JsonClient,
    url: &str,
    request_timeout: Duration,
) -> Result<T> {
    let request = build_request(Method::GET, url, Bytes::new())?;
    let response = send(client, url, request, request_timeout).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Registry(format!("GET {} returned status: {}", url, status)));
    }

    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::protocol(format!("Failed to read response from {}: {}", url, e)))?
        .to_bytes();

    Ok(serde_json::from_slice(&bytes)?)
}

fn build_request(method: Method, url: &str, body: Bytes) -> Result<Request<Full<Bytes>>> {
    let uri: Uri = url
        .parse()
        .map_err(|e| Error::protocol(format!("Invalid URI {}: {}", url, e)))?;

    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body))
        .map_err(|e| Error::protocol(format!("Failed to build request: {}", e)))
}

async fn send(
    client: &JsonClient,
    url: &str,
    request: Request<Full<Bytes>>,
    request_timeout: Duration,
) -> Result<hyper::Response<hyper::body::Incoming>> {
    match timeout(request_timeout, client.request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(Error::protocol(format!("HTTP request to {} failed: {}", url, e))),
        Err(_) => Err(Error::protocol(format!(
            "HTTP request to {} timed out after {:?}",
            url, request_timeout
        ))),
    }
}

//! Registry client used by instances.
//!
//! # Rust Learning Note
//!
//! ## One pooled client, many calls
//!
//! `RegistryClient` owns a hyper-util `Client`, which is an `Arc` inside.
//! Cloning the registry client shares the connection pool, so a service
//! can hand copies to every task that needs to talk to the registry.

use crate::http_client::{get_json, new_json_client, post_json, JsonClient};
use crate::storage::ServiceMap;
use crate::types::{Patch, Registration};
use hyper::StatusCode;
use std::time::Duration;
use svcreg_common::{Error, Result};
use tracing::{debug, info};

/// Default registry location.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:3000";

/// HTTP client for the registry API.
#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    client: JsonClient,
    request_timeout: Duration,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!("Creating registry client for {}", base_url);

        Self {
            base_url,
            client: new_json_client(),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registers (or re-registers) an instance.
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        let url = format!("{}/services", self.base_url);
        let status = post_json(&self.client, &url, registration, self.request_timeout).await?;
        expect_ok(status, "register")?;

        info!(
            "Registered {} at {} with {}",
            registration.name, registration.instance_url, self.base_url
        );
        Ok(())
    }

    /// Removes an instance. Succeeds even if the registry did not know it.
    pub async fn deregister(&self, patch: &Patch) -> Result<()> {
        let url = format!("{}/services/deregister", self.base_url);
        let status = post_json(&self.client, &url, patch, self.request_timeout).await?;
        expect_ok(status, "deregister")?;

        info!("Deregistered {} at {}", patch.name, patch.instance_url);
        Ok(())
    }

    /// Fetches the full name -> instances mapping.
    pub async fn services(&self) -> Result<ServiceMap> {
        let url = format!("{}/services", self.base_url);
        get_json(&self.client, &url, self.request_timeout).await
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

fn expect_ok(status: StatusCode, operation: &str) -> Result<()> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(Error::Registry(format!("{} failed with status: {}", operation, status)))
    }
}

//! Bounded-retry liveness probing.
//!
//! A probe is the unit the heartbeat monitor schedules per instance per
//! tick. It makes up to `attempts` single-shot checks, sleeping `backoff`
//! between failed attempts, and reports one verdict. Individual attempt
//! failures are logged here and never surface as errors.

use crate::http::{check_http_health, new_client, HttpCheckConfig, HttpClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Per-attempt GET timeout.
    pub timeout: Duration,
    /// Pause after a failed attempt before the next one.
    pub backoff: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(2),
            backoff: Duration::from_secs(1),
        }
    }
}

/// Final verdict of one probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub healthy: bool,
    /// Attempts actually made (1..=policy.attempts).
    pub attempts: u32,
    pub last_error: Option<String>,
    /// When the verdict was reached; for a healthy probe, the time of the
    /// successful check.
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn healthy(attempts: u32) -> Self {
        Self {
            healthy: true,
            attempts,
            last_error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            attempts,
            last_error: Some(reason.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }
}

/// Something that can decide whether a heartbeat endpoint is alive.
///
/// The monitor only depends on this trait, so ticks can be driven by a
/// scripted prober in tests.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, heartbeat_url: &str) -> ProbeOutcome;
}

/// HTTP GET prober with a fixed retry budget.
#[derive(Clone)]
pub struct HttpProber {
    policy: ProbePolicy,
    client: HttpClient,
}

impl HttpProber {
    pub fn new(policy: ProbePolicy) -> Self {
        Self {
            policy,
            client: new_client(),
        }
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(ProbePolicy::default())
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, heartbeat_url: &str) -> ProbeOutcome {
        let config = HttpCheckConfig::new(heartbeat_url).with_timeout(self.policy.timeout);
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            match check_http_health(&self.client, &config).await {
                Ok(data) if data.is_healthy => {
                    debug!(
                        "Heartbeat ok: {} (attempt {}, {}ms)",
                        heartbeat_url, attempt, data.response_time_ms
                    );
                    return ProbeOutcome::healthy(attempt).at(data.checked_at);
                }
                Ok(data) => {
                    last_error = data
                        .error_message
                        .unwrap_or_else(|| format!("status {}", data.status_code));
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                "Heartbeat attempt {}/{} failed for {}: {}",
                attempt, attempts, heartbeat_url, last_error
            );

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        ProbeOutcome::unhealthy(attempts, last_error)
    }
}

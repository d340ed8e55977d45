//! Heartbeat Monitor - periodic liveness sweep over every registration
//!
//! Each tick:
//! 1. snapshots the store's instance list,
//! 2. probes every instance concurrently,
//! 3. waits for the whole batch (no removal is applied before every
//!    probe of the tick has finished),
//! 4. removes each instance that exhausted its retry budget and awaits
//!    the remove fan-out to its dependents,
//! 5. sleeps for the tick interval.
//!
//! The monitor has an explicit lifecycle: `start` spawns the loop and
//! returns its cancellation token, `stop` cancels and joins it. The
//! token is checked between ticks and while a probe batch is in flight;
//! a batch interrupted by cancellation applies no removals.
//!
//! Removed instances are not re-added when their heartbeat recovers;
//! they come back only through a fresh registration.

use crate::notifier::FanoutNotifier;
use crate::storage::RegistrationStore;
use crate::types::{Patch, Registration};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use svcreg_monitoring::{ProbeOutcome, Prober};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Heartbeat loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,

    /// Maximum probes in flight during one tick
    pub probe_concurrency: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            probe_concurrency: 64,
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Instances probed this tick
    pub probed: usize,

    /// Instances that answered within their retry budget
    pub healthy: usize,

    /// Instances evicted this tick
    pub removed: Vec<Patch>,

    /// True when cancellation interrupted the probe batch
    pub cancelled: bool,
}

struct MonitorInner {
    store: RegistrationStore,
    prober: Arc<dyn Prober>,
    notifier: FanoutNotifier,
    config: HeartbeatConfig,
}

/// Heartbeat monitor - runs the liveness sweep in a background task
pub struct HeartbeatMonitor {
    inner: Arc<MonitorInner>,

    /// Cancels the loop and any in-flight probe batch
    cancel_token: CancellationToken,

    /// Background task handle
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(
        store: RegistrationStore,
        prober: Arc<dyn Prober>,
        notifier: FanoutNotifier,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                store,
                prober,
                notifier,
                config,
            }),
            cancel_token: CancellationToken::new(),
            task_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.inner.config
    }

    /// Start the heartbeat loop.
    ///
    /// Returns the token that stops the loop when cancelled. Calling
    /// `start` again (or after `stop`) does not spawn a second loop.
    pub fn start(&self) -> CancellationToken {
        let mut task_handle = self.task_handle.lock();

        if task_handle.is_some() {
            warn!("Heartbeat monitor already started");
            return self.cancel_token.clone();
        }
        if self.cancel_token.is_cancelled() {
            warn!("Heartbeat monitor was stopped and cannot be restarted");
            return self.cancel_token.clone();
        }

        let inner = Arc::clone(&self.inner);
        let token = self.cancel_token.clone();
        *task_handle = Some(tokio::spawn(async move {
            inner.run_loop(token).await;
        }));

        info!(
            "Heartbeat monitor started (interval: {:?}, probe concurrency: {})",
            self.inner.config.interval, self.inner.config.probe_concurrency
        );
        self.cancel_token.clone()
    }

    /// Stop the heartbeat loop and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel_token.cancel();

        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Heartbeat loop panicked: {}", e);
                }
            }
            info!("Heartbeat monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Run a single tick now, outside the background loop.
    pub async fn run_tick(&self) -> TickReport {
        self.inner.tick(&self.cancel_token).await
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl MonitorInner {
    async fn run_loop(&self, token: CancellationToken) {
        info!("Heartbeat loop running");

        loop {
            if token.is_cancelled() {
                break;
            }

            let report = self.tick(&token).await;
            if report.cancelled {
                break;
            }
            if report.probed > 0 {
                debug!(
                    "Heartbeat tick: probed={} healthy={} removed={}",
                    report.probed,
                    report.healthy,
                    report.removed.len()
                );
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Heartbeat loop exited");
    }

    async fn tick(&self, token: &CancellationToken) -> TickReport {
        let instances = self.store.instances();
        let mut report = TickReport {
            probed: instances.len(),
            ..TickReport::default()
        };
        if instances.is_empty() {
            return report;
        }

        debug!("🔍 Probing {} instances", instances.len());

        let semaphore = Arc::new(Semaphore::new(self.config.probe_concurrency.max(1)));
        let mut probes: JoinSet<(Registration, ProbeOutcome)> = JoinSet::new();
        for reg in instances {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = prober.probe(&reg.heartbeat_url).await;
                (reg, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(report.probed);
        let completed = tokio::select! {
            _ = token.cancelled() => false,
            _ = collect_probes(&mut probes, &mut outcomes) => true,
        };

        if !completed {
            probes.abort_all();
            info!("Heartbeat tick cancelled; no removals applied");
            report.cancelled = true;
            return report;
        }

        for (reg, outcome) in outcomes {
            if outcome.healthy {
                report.healthy += 1;
                continue;
            }

            warn!(
                "❌ {} at {} failed {} heartbeat attempts (last at {}): {}",
                reg.name,
                reg.instance_url,
                outcome.attempts,
                outcome.checked_at.to_rfc3339(),
                outcome.last_error.as_deref().unwrap_or("unknown")
            );

            match self.store.remove(reg.name.as_str(), &reg.instance_url) {
                Some(removed) => {
                    info!("🚨 Evicted {} at {}", removed.name, removed.instance_url);
                    self.notifier.notify_remove(&removed).await;
                    report.removed.push(removed.patch());
                }
                None => {
                    debug!(
                        "{} at {} already gone before eviction",
                        reg.name, reg.instance_url
                    );
                }
            }
        }

        report
    }
}

/// Drains a probe batch. A panicked probe yields no verdict, so its
/// instance is kept until the next tick.
async fn collect_probes(
    probes: &mut JoinSet<(Registration, ProbeOutcome)>,
    outcomes: &mut Vec<(Registration, ProbeOutcome)>,
) {
    while let Some(result) = probes.join_next().await {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("Heartbeat probe task failed: {}", e),
        }
    }
}

//! Dependency update fan-out.
//!
//! Pushes `Update` messages to the `/update` endpoint of every instance
//! affected by a registration change. Delivery is best-effort: failures
//! are logged and counted, never retried and never returned to the
//! caller that triggered the change.
//!
//! Each batch runs at most `concurrency` POSTs at once (semaphore +
//! `JoinSet`) and every POST carries `timeout`, so a hung dependent
//! costs one timeout and holds one permit.

use crate::http_client::{new_json_client, post_json, JsonClient};
use crate::storage::RegistrationStore;
use crate::types::{Registration, Update};
use hyper::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Fan-out limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Timeout of each outbound POST.
    pub timeout: Duration,
    /// Maximum POSTs in flight per batch.
    pub concurrency: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            concurrency: 16,
        }
    }
}

/// What happened to one fan-out batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// One push: destination URL and the batch to send there.
struct Delivery {
    target: String,
    update_url: String,
    update: Update,
}

/// Computes dependents from the store and pushes updates to them.
#[derive(Clone)]
pub struct FanoutNotifier {
    store: RegistrationStore,
    client: JsonClient,
    config: NotifyConfig,
}

impl FanoutNotifier {
    pub fn new(store: RegistrationStore, config: NotifyConfig) -> Self {
        Self {
            store,
            client: new_json_client(),
            config,
        }
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Announces a new (or replaced) registration.
    ///
    /// The new instance receives `Add` with every live instance of the
    /// names it depends on. Every other instance that depends on the new
    /// instance's name receives `Add: [new]`. Nobody else is told.
    pub async fn notify_add(&self, reg: &Registration) -> FanoutReport {
        let mut deliveries = Vec::new();

        let available = self.store.patches_for(&reg.depends_on);
        if available.is_empty() {
            debug!("No live dependencies to announce to {} at {}", reg.name, reg.instance_url);
        } else {
            deliveries.push(Delivery {
                target: reg.instance_url.clone(),
                update_url: reg.update_url.clone(),
                update: Update::add(available),
            });
        }

        let announcement = Update::add(vec![reg.patch()]);
        deliveries.extend(
            self.store
                .dependents_of(reg.name.as_str())
                .into_iter()
                .filter(|dependent| !dependent.same_identity(reg))
                .map(|dependent| Delivery {
                    target: dependent.instance_url,
                    update_url: dependent.update_url,
                    update: announcement.clone(),
                }),
        );

        let report = self.deliver(deliveries).await;
        info!(
            "Add fan-out for {} at {}: {} attempted, {} delivered, {} failed",
            reg.name, reg.instance_url, report.attempted, report.delivered, report.failed
        );
        report
    }

    /// Tells every dependent of `removed.name` that this instance is gone.
    ///
    /// Blocks until every push has completed or failed.
    pub async fn notify_remove(&self, removed: &Registration) -> FanoutReport {
        let update = Update::remove(vec![removed.patch()]);

        let deliveries = self
            .store
            .dependents_of(removed.name.as_str())
            .into_iter()
            .map(|dependent| Delivery {
                target: dependent.instance_url,
                update_url: dependent.update_url,
                update: update.clone(),
            })
            .collect();

        let report = self.deliver(deliveries).await;
        info!(
            "Remove fan-out for {} at {}: {} attempted, {} delivered, {} failed",
            removed.name, removed.instance_url, report.attempted, report.delivered, report.failed
        );
        report
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) -> FanoutReport {
        let mut report = FanoutReport::default();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut pushes: JoinSet<bool> = JoinSet::new();

        for delivery in deliveries {
            if delivery.update_url.is_empty() {
                debug!("{} has no update endpoint, skipping", delivery.target);
                continue;
            }

            report.attempted += 1;
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let request_timeout = self.config.timeout;

            pushes.spawn(async move {
                // Permit dropped when the push finishes
                let _permit = semaphore.acquire_owned().await.ok();

                match post_json(&client, &delivery.update_url, &delivery.update, request_timeout)
                    .await
                {
                    Ok(status) if status == StatusCode::OK => {
                        debug!("Update delivered to {}", delivery.target);
                        true
                    }
                    Ok(status) => {
                        warn!(
                            "Update rejected by {} ({}): status {}",
                            delivery.target, delivery.update_url, status
                        );
                        false
                    }
                    Err(e) => {
                        warn!("Update push to {} failed: {}", delivery.target, e);
                        false
                    }
                }
            });
        }

        while let Some(result) = pushes.join_next().await {
            match result {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!("Update push task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

//! Registry server: wires the store, prober, notifier, heartbeat monitor
//! and HTTP router together and runs them until shutdown.
//!
//! # Rust Learning Note
//!
//! ## Graceful shutdown
//!
//! `run` and `serve` take any `Future<Output = ()>` as the shutdown
//! signal. The binary passes a Ctrl+C/SIGTERM future, tests pass a
//! oneshot receiver. When it resolves, axum stops accepting connections
//! and drains in-flight requests, then the heartbeat loop is stopped.

use crate::{
    api::{create_router, AppState},
    config::RegistryConfig,
    heartbeat::HeartbeatMonitor,
    notifier::FanoutNotifier,
    storage::RegistrationStore,
};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use svcreg_common::Result;
use svcreg_monitoring::{HttpProber, Prober};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Service registry server.
pub struct RegistryServer {
    config: RegistryConfig,
    store: RegistrationStore,
    monitor: HeartbeatMonitor,
    router: Router,
}

impl RegistryServer {
    /// Creates a server probing instances over HTTP.
    pub fn new(config: RegistryConfig) -> Self {
        let prober = Arc::new(HttpProber::new(config.probe_policy()));
        Self::with_prober(config, prober)
    }

    /// Creates a server with a custom liveness prober.
    pub fn with_prober(config: RegistryConfig, prober: Arc<dyn Prober>) -> Self {
        let store = RegistrationStore::new();
        let notifier = FanoutNotifier::new(store.clone(), config.notify_config());
        let monitor = HeartbeatMonitor::new(
            store.clone(),
            prober,
            notifier.clone(),
            config.heartbeat_config(),
        );
        let router = create_router(AppState::new(store.clone(), notifier));

        Self {
            config,
            store,
            monitor,
            router,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &RegistrationStore {
        &self.store
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    /// Binds `0.0.0.0:<port>` and serves until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.registry.port));
        info!("Binding to TCP: {}", addr);

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind {}: {}", addr, e);
            e
        })?;

        self.serve(listener, shutdown).await
    }

    /// Serves on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!("Registry listening on {}", local_addr);

        self.monitor.start();

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;

        self.monitor.stop().await;

        match served {
            Ok(()) => {
                info!("Registry server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Registry server failed: {}", e);
                Err(e.into())
            }
        }
    }
}

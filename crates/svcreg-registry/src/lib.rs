//! # svcreg Registry
//!
//! The registry authority: services register an HTTP endpoint, the
//! registry probes each instance's heartbeat on a fixed tick, and
//! add/remove events are pushed to every instance that declared a
//! dependency on the affected service name.
//!
//! This crate provides:
//! - The concurrent registration store (`storage`)
//! - Dependency update fan-out (`notifier`)
//! - The heartbeat monitor with an explicit start/stop lifecycle (`heartbeat`)
//! - The HTTP API and server wiring (`api`, `server`)
//! - YAML configuration (`config`)
//! - The instance side of the protocol: registry client and the
//!   `/heartbeat` + `/update` handlers with a local dependency cache
//!   (`client`, `instance`)
//! - The `svcreg` executable

pub mod api;
pub mod client;
pub mod config;
pub mod heartbeat;
pub mod http_client;
pub mod instance;
pub mod notifier;
pub mod server;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use client::RegistryClient;
pub use config::RegistryConfig;
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, TickReport};
pub use instance::{instance_router, DependencyCache};
pub use notifier::{FanoutNotifier, FanoutReport, NotifyConfig};
pub use server::RegistryServer;
pub use storage::RegistrationStore;
pub use types::{Patch, Registration, Update};

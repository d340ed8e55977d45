//! In-memory registration store.
//!
//! # Rust Learning Note
//!
//! ## One lock, not a sharded map
//!
//! A sharded concurrent map would let two readers see different shards
//! at different moments. The snapshot and the dependents scan both need
//! a consistent view of *every* name at once, so the whole map sits
//! behind a single `parking_lot::RwLock`:
//!
//! ```rust,ignore
//! let services = self.services.read();   // guard, no `.await` while held
//! services.values().flatten().cloned().collect()
//! ```
//!
//! Guards are never held across an `.await`; callers receive clones and
//! do their network I/O after the lock is released.

use crate::types::{Patch, Registration};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use svcreg_common::ServiceName;
use tracing::{debug, info};

/// Snapshot shape returned by `GET /services`.
pub type ServiceMap = BTreeMap<ServiceName, Vec<Registration>>;

/// Thread-safe store of live registrations, keyed by service name.
///
/// Cloning is cheap and every clone shares the same underlying map.
#[derive(Clone, Default)]
pub struct RegistrationStore {
    services: Arc<RwLock<ServiceMap>>,
}

impl RegistrationStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a registration, or replaces the one with the same
    /// `(name, instance_url)`. Returns `true` when an entry was replaced.
    pub fn upsert(&self, reg: Registration) -> bool {
        let name = reg.name.clone();
        let instance_url = reg.instance_url.clone();

        let replaced = {
            let mut services = self.services.write();
            let instances = services.entry(reg.name.clone()).or_default();
            match instances
                .iter_mut()
                .find(|existing| existing.instance_url == reg.instance_url)
            {
                Some(existing) => {
                    *existing = reg;
                    true
                }
                None => {
                    instances.push(reg);
                    false
                }
            }
        };

        if replaced {
            info!("Replaced registration: {} at {}", name, instance_url);
        } else {
            info!("Registered new instance: {} at {}", name, instance_url);
        }
        replaced
    }

    /// Removes the instance with the given identity.
    ///
    /// Absent identities are a no-op returning `None`; removal races with
    /// re-registration and heartbeat eviction are expected.
    pub fn remove(&self, name: &str, instance_url: &str) -> Option<Registration> {
        let mut services = self.services.write();
        let instances = services.get_mut(name)?;

        let (removed, kept): (Vec<Registration>, Vec<Registration>) = std::mem::take(instances)
            .into_iter()
            .partition(|reg| reg.instance_url == instance_url);

        if kept.is_empty() {
            services.remove(name);
        } else {
            *instances = kept;
        }
        drop(services);

        let removed = removed.into_iter().next();
        match &removed {
            Some(_) => info!("Removed instance: {} at {}", name, instance_url),
            None => debug!("Remove of absent instance ignored: {} at {}", name, instance_url),
        }
        removed
    }

    /// Deep copy of the whole map, taken atomically.
    pub fn snapshot(&self) -> ServiceMap {
        self.services.read().clone()
    }

    /// Every instance of every name, flattened.
    pub fn instances(&self) -> Vec<Registration> {
        self.services.read().values().flatten().cloned().collect()
    }

    /// Every stored registration that declared a dependency on `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<Registration> {
        self.services
            .read()
            .values()
            .flatten()
            .filter(|reg| reg.depends_on.contains(name))
            .cloned()
            .collect()
    }

    /// Patches of every instance registered under any of `names`.
    pub fn patches_for<'a, I>(&self, names: I) -> Vec<Patch>
    where
        I: IntoIterator<Item = &'a ServiceName>,
    {
        let services = self.services.read();
        names
            .into_iter()
            .filter_map(|name| services.get(name))
            .flatten()
            .map(Registration::patch)
            .collect()
    }

    pub fn get(&self, name: &str, instance_url: &str) -> Option<Registration> {
        self.services
            .read()
            .get(name)?
            .iter()
            .find(|reg| reg.instance_url == instance_url)
            .cloned()
    }

    /// Total number of registered instances.
    pub fn len(&self) -> usize {
        self.services.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registration;

    #[test]
    fn test_upsert_and_get() {
        let store = RegistrationStore::new();
        let replaced = store.upsert(registration("log", "http://h1/log", &[]));

        assert!(!replaced);
        assert_eq!(store.len(), 1);
        assert!(store.get("log", "http://h1/log").is_some());
        assert!(store.get("log", "http://h2/log").is_none());
    }

    #[test]
    fn test_upsert_replaces_by_identity() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));

        let mut newer = registration("log", "http://h1/log", &["auth"]);
        newer.heartbeat_url = "http://h1/new-heartbeat".to_string();
        assert!(store.upsert(newer));

        assert_eq!(store.len(), 1);
        let stored = store.get("log", "http://h1/log").unwrap();
        assert_eq!(stored.heartbeat_url, "http://h1/new-heartbeat");
        assert!(stored.depends_on.contains("auth"));
    }

    #[test]
    fn test_identity_uniqueness_over_many_upserts() {
        let store = RegistrationStore::new();
        for round in 0..5 {
            for i in 0..4 {
                let mut reg = registration("log", &format!("http://h{}/log", i), &[]);
                reg.port = format!(":{}", round);
                store.upsert(reg);
            }
        }

        let snapshot = store.snapshot();
        let instances = &snapshot["log"];
        assert_eq!(instances.len(), 4);
        // last upsert wins
        assert!(instances.iter().all(|reg| reg.port == ":4"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));
        store.upsert(registration("log", "http://h2/log", &[]));

        let removed = store.remove("log", "http://h1/log");
        assert_eq!(removed.unwrap().instance_url, "http://h1/log");
        let after_first = store.snapshot();

        assert!(store.remove("log", "http://h1/log").is_none());
        assert!(store.remove("missing", "http://h9/x").is_none());
        assert_eq!(store.snapshot(), after_first);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_last_instance_drops_name() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));
        store.remove("log", "http://h1/log");

        assert!(store.is_empty());
        assert!(!store.snapshot().contains_key("log"));
    }

    #[test]
    fn test_dependents_of() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));
        store.upsert(registration("function", "http://h2/f", &["log"]));
        store.upsert(registration("function", "http://h3/f", &["log", "auth"]));
        store.upsert(registration("auth", "http://h4/a", &[]));

        let dependents = store.dependents_of("log");
        assert_eq!(dependents.len(), 2);
        assert!(dependents.iter().all(|reg| reg.name.as_str() == "function"));

        assert_eq!(store.dependents_of("auth").len(), 1);
        assert!(store.dependents_of("function").is_empty());
    }

    #[test]
    fn test_patches_for() {
        let store = RegistrationStore::new();
        store.upsert(registration("log", "http://h1/log", &[]));
        store.upsert(registration("log", "http://h2/log", &[]));
        store.upsert(registration("auth", "http://h3/a", &[]));

        let wanted = [ServiceName::from("log"), ServiceName::from("missing")];
        let mut patches = store.patches_for(&wanted);
        patches.sort();

        assert_eq!(
            patches,
            vec![
                Patch::new("log", "http://h1/log"),
                Patch::new("log", "http://h2/log"),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_upserts() {
        let store = RegistrationStore::new();
        let mut handles = vec![];

        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert(registration("log", &format!("http://h{}/log", i), &[]));
                // duplicate identity from a second writer
                store.upsert(registration("log", &format!("http://h{}/log", i), &[]));
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_snapshot_never_sees_partial_registration() {
        let store = RegistrationStore::new();
        let old = registration("log", "http://h1/log", &[]);
        let mut new = registration("log", "http://h1/log", &["auth"]);
        new.heartbeat_url = "http://h1/hb-v2".to_string();
        new.update_url = "http://h1/up-v2".to_string();
        store.upsert(old.clone());

        let writer = {
            let store = store.clone();
            let (old, new) = (old.clone(), new.clone());
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    store.upsert(if i % 2 == 0 { new.clone() } else { old.clone() });
                }
            })
        };

        for _ in 0..2_000 {
            let snapshot = store.snapshot();
            let seen = &snapshot["log"][0];
            assert!(seen == &old || seen == &new, "observed a mixed registration");
        }

        writer.join().unwrap();
    }
}

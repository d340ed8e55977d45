//! Wire types shared by the registry and its instances.
//!
//! Field names on the wire are PascalCase (`ServiceName`, `ServiceUrl`,
//! ...). List fields accept both a missing key and an explicit `null`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use svcreg_common::{Error, Result, ServiceName};

/// A registered service instance plus the names it depends on.
///
/// Identity is `(name, instance_url)`: a second registration with the
/// same pair replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "ServiceName")]
    pub name: ServiceName,

    /// Informational listen address of the instance (e.g. ":4000").
    #[serde(rename = "ServicePort", default)]
    pub port: String,

    #[serde(rename = "ServiceUrl")]
    pub instance_url: String,

    #[serde(rename = "HeartbeatDetectionUrl", default)]
    pub heartbeat_url: String,

    /// Where this instance accepts `Update` pushes. Empty means it
    /// does not want them.
    #[serde(rename = "UpdateUrl", default)]
    pub update_url: String,

    #[serde(
        rename = "DependedServicesName",
        default,
        deserialize_with = "null_as_default"
    )]
    pub depends_on: BTreeSet<ServiceName>,
}

impl Registration {
    pub fn new(
        name: impl Into<ServiceName>,
        instance_url: impl Into<String>,
        heartbeat_url: impl Into<String>,
        update_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port: String::new(),
            instance_url: instance_url.into(),
            heartbeat_url: heartbeat_url.into(),
            update_url: update_url.into(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceName>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Identity-only projection used in update messages.
    pub fn patch(&self) -> Patch {
        Patch {
            name: self.name.clone(),
            instance_url: self.instance_url.clone(),
        }
    }

    pub fn same_identity(&self, other: &Registration) -> bool {
        self.name == other.name && self.instance_url == other.instance_url
    }

    /// Rejects registrations that have no identity.
    ///
    /// A missing heartbeat URL is accepted; such an instance fails its
    /// probes and is evicted by the heartbeat monitor.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("ServiceName must not be empty"));
        }
        if self.instance_url.is_empty() {
            return Err(Error::validation("ServiceUrl must not be empty"));
        }
        Ok(())
    }
}

/// Identity of one instance: `(ServiceName, ServiceUrl)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Patch {
    #[serde(rename = "ServiceName")]
    pub name: ServiceName,

    #[serde(rename = "ServiceUrl")]
    pub instance_url: String,
}

impl Patch {
    pub fn new(name: impl Into<ServiceName>, instance_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_url: instance_url.into(),
        }
    }
}

impl From<&Registration> for Patch {
    fn from(reg: &Registration) -> Self {
        reg.patch()
    }
}

/// One notification batch pushed to a dependent's `/update` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "Add", default, deserialize_with = "null_as_default")]
    pub add: Vec<Patch>,

    #[serde(rename = "Remove", default, deserialize_with = "null_as_default")]
    pub remove: Vec<Patch>,
}

impl Update {
    pub fn add(patches: Vec<Patch>) -> Self {
        Self {
            add: patches,
            remove: Vec::new(),
        }
    }

    pub fn remove(patches: Vec<Patch>) -> Self {
        Self {
            add: Vec::new(),
            remove: patches,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registration_wire_format() {
        let reg = Registration::new(
            "function",
            "http://localhost:4001/function",
            "http://localhost:4001/heartbeat",
            "http://localhost:4001/update",
        )
        .with_port(":4001")
        .with_dependencies(["log"]);

        let value = serde_json::to_value(&reg).unwrap();
        assert_eq!(
            value,
            json!({
                "ServiceName": "function",
                "ServicePort": ":4001",
                "ServiceUrl": "http://localhost:4001/function",
                "HeartbeatDetectionUrl": "http://localhost:4001/heartbeat",
                "UpdateUrl": "http://localhost:4001/update",
                "DependedServicesName": ["log"],
            })
        );
    }

    #[test]
    fn test_registration_tolerates_missing_and_null_fields() {
        let reg: Registration = serde_json::from_value(json!({
            "ServiceName": "log",
            "ServiceUrl": "http://localhost:4000/log",
            "HeartbeatDetectionUrl": "http://localhost:4000/heartbeat",
            "DependedServicesName": null,
        }))
        .unwrap();

        assert_eq!(reg.port, "");
        assert_eq!(reg.update_url, "");
        assert!(reg.depends_on.is_empty());
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn test_registration_requires_name() {
        let result = serde_json::from_value::<Registration>(json!({
            "ServiceUrl": "http://localhost:4000/log",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_depends_on_is_a_set() {
        let reg: Registration = serde_json::from_value(json!({
            "ServiceName": "function",
            "ServiceUrl": "http://h/f",
            "DependedServicesName": ["log", "log", "auth"],
        }))
        .unwrap();
        assert_eq!(reg.depends_on.len(), 2);
    }

    #[test]
    fn test_validate() {
        let ok = Registration::new("log", "http://h/log", "http://h/hb", "");
        assert!(ok.validate().is_ok());

        let no_name = Registration::new("", "http://h/log", "http://h/hb", "");
        assert!(matches!(no_name.validate(), Err(Error::Validation { .. })));

        let no_url = Registration::new("log", "", "http://h/hb", "");
        assert!(no_url.validate().is_err());

        let no_heartbeat = Registration::new("log", "http://h/log", "", "");
        assert!(no_heartbeat.validate().is_ok());
    }

    #[test]
    fn test_patch_and_identity() {
        let a = Registration::new("log", "http://h1/log", "http://h1/hb", "http://h1/up");
        let mut b = a.clone();
        b.heartbeat_url = "http://h1/other".to_string();

        assert!(a.same_identity(&b));
        assert_eq!(a.patch(), Patch::new("log", "http://h1/log"));
        assert_eq!(Patch::from(&b), a.patch());
    }

    #[test]
    fn test_update_wire_format() {
        let update = Update::remove(vec![Patch::new("log", "http://h1/log")]);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "Add": [],
                "Remove": [{"ServiceName": "log", "ServiceUrl": "http://h1/log"}],
            })
        );

        let decoded: Update = serde_json::from_value(json!({"Add": null})).unwrap();
        assert!(decoded.is_empty());
    }
}

//! Resource types shared between the engine and providers.
//!
//! Tags are kept in ordered maps so that every serialized form of a
//! resource is byte-for-byte stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag map with deterministic key order.
pub type TagMap = BTreeMap<String, String>;

/// Tag holding the resource name.
pub const TAG_NAME: &str = "Name";

/// Tag holding the environment tag value.
pub const TAG_ENVIRONMENT: &str = "Environment";

/// Tag holding the instance type.
pub const TAG_TYPE: &str = "Type";

/// A desired resource, derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique name, `<prefix>-NN`.
    pub name: String,
    /// Name of the environment that owns this resource.
    pub environment: String,
    /// Selected instance type.
    pub instance_type: String,
    /// Merged tag map.
    pub tags: TagMap,
}

/// A resource as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResource {
    /// Provider-assigned identifier.
    pub id: String,
    /// Resource name.
    pub name: String,
    /// Instance type currently running.
    pub instance_type: String,
    /// Tags currently applied.
    #[serde(default)]
    pub tags: TagMap,
}

impl ObservedResource {
    /// Builds the observed form of a desired resource, as a provider would
    /// report it right after creating it.
    #[must_use]
    pub fn from_spec(spec: &ResourceSpec, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: spec.name.clone(),
            instance_type: spec.instance_type.clone(),
            tags: spec.tags.clone(),
        }
    }

    /// Returns true if the name is `<prefix>-<digits>`.
    #[must_use]
    pub fn belongs_to(&self, prefix: &str) -> bool {
        self.name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
    }
}

impl std::fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.instance_type)
    }
}

impl std::fmt::Display for ObservedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] ({})", self.name, self.id, self.instance_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(name: &str) -> ObservedResource {
        ObservedResource {
            id: String::from("i-1"),
            name: name.to_string(),
            instance_type: String::from("t3.micro"),
            tags: TagMap::new(),
        }
    }

    #[test]
    fn test_belongs_to_prefix() {
        assert!(observed("web-01").belongs_to("web"));
        assert!(observed("web-100").belongs_to("web"));
        assert!(!observed("web-api-01").belongs_to("web"));
        assert!(!observed("web-").belongs_to("web"));
        assert!(!observed("webby-01").belongs_to("web"));
        assert!(observed("web-api-01").belongs_to("web-api"));
    }
}

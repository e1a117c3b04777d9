//! Configuration hashing for change detection.
//!
//! Hashes are computed over a canonical byte layout so that the same
//! configuration always produces the same digest, independent of YAML key
//! order or formatting.

use sha2::{Digest, Sha256};

use super::spec::{EnvironmentConfig, FleetConfig};

/// Hasher for computing configuration and plan fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the parts of the configuration that shape desired state.
    ///
    /// Execution tuning, state and provider settings are excluded: changing a
    /// batch size does not change what should exist.
    #[must_use]
    pub fn hash_config(&self, config: &FleetConfig) -> String {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, config.global.region.as_bytes());
        update_field(&mut hasher, config.global.ami.as_bytes());
        update_count(&mut hasher, config.global.default_tags.len());
        for (key, value) in &config.global.default_tags {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        update_count(&mut hasher, config.environments.len());
        for (name, env) in &config.environments {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, self.hash_environment(env).as_bytes());
        }

        if let Some(catalog) = &config.instance_catalog {
            update_count(&mut hasher, catalog.extra_families.len());
            for family in &catalog.extra_families {
                update_field(&mut hasher, family.as_bytes());
            }
            update_count(&mut hasher, catalog.extra_sizes.len());
            for size in &catalog.extra_sizes {
                update_field(&mut hasher, size.as_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single environment.
    #[must_use]
    pub fn hash_environment(&self, env: &EnvironmentConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(env.count.to_be_bytes());
        update_field(&mut hasher, env.prefix.as_bytes());
        update_count(&mut hasher, env.instance_types.len());
        for instance_type in &env.instance_types {
            update_field(&mut hasher, instance_type.as_bytes());
        }
        update_field(&mut hasher, env.environment_tag.as_deref().unwrap_or("").as_bytes());
        update_field(&mut hasher, env.allocation.to_string().as_bytes());
        update_count(&mut hasher, env.tags.len());
        for (key, value) in &env.tags {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of arbitrary bytes (used for plan fingerprints).
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Prefixes a list with its length so neighbouring lists cannot trade items.
fn update_count(hasher: &mut Sha256, count: usize) {
    hasher.update((count as u64).to_be_bytes());
}

/// Length-prefixes a field so adjacent fields cannot run together.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocationPolicy, CatalogConfig, GlobalConfig};
    use std::collections::BTreeMap;

    fn create_test_config() -> FleetConfig {
        let mut environments = BTreeMap::new();
        environments.insert(
            String::from("dev"),
            EnvironmentConfig {
                count: 4,
                prefix: String::from("dev"),
                instance_types: vec![String::from("t3.micro"), String::from("t3.small")],
                environment_tag: None,
                allocation: AllocationPolicy::Split,
                tags: BTreeMap::new(),
            },
        );

        FleetConfig {
            global: GlobalConfig {
                region: String::from("us-east-1"),
                ami: String::from("ami-0123abcd"),
                default_tags: BTreeMap::from([(String::from("Owner"), String::from("infra"))]),
            },
            environments,
            instance_catalog: None,
            execution: crate::config::ExecutionConfig::default(),
            state: crate::config::StateConfig::default(),
            provider: crate::config::ProviderConfig::default(),
        }
    }

    #[test]
    fn test_config_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let config = create_test_config();

        assert_eq!(hasher.hash_config(&config), hasher.hash_config(&config));
    }

    #[test]
    fn test_count_change_changes_hash() {
        let hasher = ConfigHasher::new();
        let config = create_test_config();
        let mut scaled = config.clone();
        if let Some(dev) = scaled.environments.get_mut("dev") {
            dev.count = 5;
        }

        assert_ne!(hasher.hash_config(&config), hasher.hash_config(&scaled));
    }

    #[test]
    fn test_execution_tuning_does_not_change_hash() {
        let hasher = ConfigHasher::new();
        let config = create_test_config();
        let mut tuned = config.clone();
        tuned.execution.batch_size = 50;

        assert_eq!(hasher.hash_config(&config), hasher.hash_config(&tuned));
    }

    #[test]
    fn test_catalog_lists_hash_apart() {
        let hasher = ConfigHasher::new();
        let mut as_family = create_test_config();
        as_family.instance_catalog = Some(CatalogConfig {
            extra_families: vec![String::from("metal")],
            extra_sizes: Vec::new(),
        });
        let mut as_size = create_test_config();
        as_size.instance_catalog = Some(CatalogConfig {
            extra_families: Vec::new(),
            extra_sizes: vec![String::from("metal")],
        });

        assert_ne!(hasher.hash_config(&as_family), hasher.hash_config(&as_size));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}

//! Configuration specification types for the provisioning engine.
//!
//! This module defines the structs that map to the `fleetform.yaml` file.
//! They are declarative: nothing here is derived from provider state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetConfig {
    /// Provider-wide settings shared by every environment.
    pub global: GlobalConfig,
    /// Environments keyed by their unique name.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    /// Additions to the built-in instance type catalog.
    #[serde(default)]
    pub instance_catalog: Option<CatalogConfig>,
    /// Plan execution tuning.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// State file configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Provider selection.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Settings shared by every environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Region identifier (e.g. `us-east-1`).
    pub region: String,
    /// Machine image identifier (e.g. `ami-0123abcd`).
    pub ami: String,
    /// Tags applied to every resource before environment-specific keys.
    #[serde(default)]
    pub default_tags: BTreeMap<String, String>,
}

/// Configuration for a single environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Desired number of instances.
    pub count: u32,
    /// Naming prefix; resources are named `<prefix>-NN`.
    pub prefix: String,
    /// Ordered instance type pool the allocation policy draws from.
    #[serde(default)]
    pub instance_types: Vec<String>,
    /// Value of the `Environment` tag. Defaults to the environment name.
    #[serde(default)]
    pub environment_tag: Option<String>,
    /// How instance types are assigned to indices.
    #[serde(default)]
    pub allocation: AllocationPolicy,
    /// Extra tags merged after the global defaults.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Rule that picks an instance type for each index of an environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocationPolicy {
    /// First half gets `type[0]`, second half gets `type[1]`.
    Split,
    /// `type[index mod len]`.
    #[default]
    Cycle,
    /// Always `type[0]`.
    Constant,
}

/// Catalog additions; the built-in families and sizes always apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CatalogConfig {
    /// Extra instance families (e.g. `m7g`).
    #[serde(default)]
    pub extra_families: Vec<String>,
    /// Extra instance sizes (e.g. `metal`).
    #[serde(default)]
    pub extra_sizes: Vec<String>,
}

/// Plan execution tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Bound on every provider call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of provider calls issued concurrently.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    #[serde(default)]
    pub batch_delay_ms: u64,
    /// Reconciliation attempts before reporting leftovers.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Whether unmatched observed resources are destroyed.
    #[serde(default = "default_prune")]
    pub prune: bool,
    /// Stop issuing calls after the first failed batch.
    #[serde(default)]
    pub fail_fast: bool,
}

/// State file configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Directory holding `state.json` (defaults to `.fleetform` next to the config).
    #[serde(default)]
    pub dir: Option<String>,
}

/// Provider selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    /// Provider implementation.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Inventory file for the local provider (defaults to `<state dir>/inventory.json`).
    #[serde(default)]
    pub inventory: Option<String>,
}

/// Available provider implementations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// File-backed simulated provider.
    #[default]
    Local,
}

// Default value functions

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_batch_size() -> usize {
    10
}

const fn default_max_attempts() -> u32 {
    1
}

const fn default_prune() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            batch_delay_ms: 0,
            max_attempts: default_max_attempts(),
            prune: default_prune(),
            fail_fast: false,
        }
    }
}

impl FleetConfig {
    /// Returns the total desired instance count across all environments.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.environments.values().map(|e| u64::from(e.count)).sum()
    }

    /// Returns environment names in order.
    #[must_use]
    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }
}

impl EnvironmentConfig {
    /// Returns the `Environment` tag value for an environment named `name`.
    #[must_use]
    pub fn environment_tag_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.environment_tag.as_deref().unwrap_or(name)
    }
}

impl std::fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Split => "split",
            Self::Cycle => "cycle",
            Self::Constant => "constant",
        };
        write!(f, "{s}")
    }
}

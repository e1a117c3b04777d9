//! Resource expansion from environment configuration.
//!
//! Expansion is pure: the same environment always yields the same ordered
//! list of resources, so plans are reproducible across runs and machines.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{AllocationPolicy, EnvironmentConfig, FleetConfig};
use crate::error::{PlanError, Result};
use crate::provider::{ResourceSpec, TAG_ENVIRONMENT, TAG_NAME, TAG_TYPE, TagMap};

/// Expands environments into ordered resource specifications.
#[derive(Debug, Clone, Copy)]
pub struct ResourceExpander<'a> {
    /// Tags applied to every resource before environment keys.
    default_tags: &'a TagMap,
}

/// Desired resources keyed by environment name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DesiredState {
    environments: BTreeMap<String, Vec<ResourceSpec>>,
}

impl<'a> ResourceExpander<'a> {
    /// Creates an expander that merges `default_tags` into every resource.
    #[must_use]
    pub const fn new(default_tags: &'a TagMap) -> Self {
        Self { default_tags }
    }

    /// Expands one environment into `count` resources, in index order.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Expansion` if the instance type pool does not fit
    /// the allocation policy. Validation rejects such configurations first,
    /// so reaching this error means the validator was bypassed.
    pub fn expand(&self, env_name: &str, env: &EnvironmentConfig) -> Result<Vec<ResourceSpec>> {
        if env.count == 0 {
            debug!("Environment '{env_name}' has count 0, nothing to expand");
            return Ok(Vec::new());
        }

        let pool = &env.instance_types;
        match env.allocation {
            AllocationPolicy::Split if pool.len() != 2 => {
                return Err(expansion_error(
                    env_name,
                    format!("split allocation needs exactly 2 instance types, got {}", pool.len()),
                ));
            }
            _ if pool.is_empty() => {
                return Err(expansion_error(
                    env_name,
                    format!("{} resource(s) requested with an empty instance type pool", env.count),
                ));
            }
            _ => {}
        }

        let environment_tag = env.environment_tag_or(env_name);
        let resources: Vec<ResourceSpec> = (0..env.count as usize)
            .map(|index| {
                let name = format!("{}-{:02}", env.prefix, index + 1);
                let instance_type = select_instance_type(env.allocation, pool, index, env.count as usize);
                let tags = self.merge_tags(&env.tags, &name, environment_tag, instance_type);

                ResourceSpec {
                    name,
                    environment: env_name.to_string(),
                    instance_type: instance_type.to_string(),
                    tags,
                }
            })
            .collect();

        debug!(
            "Expanded environment '{env_name}' into {} resource(s) ({} allocation)",
            resources.len(),
            env.allocation
        );
        Ok(resources)
    }

    /// Expands every environment of a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first expansion error.
    pub fn expand_all(config: &FleetConfig) -> Result<DesiredState> {
        let expander = ResourceExpander::new(&config.global.default_tags);

        let environments = config
            .environments
            .iter()
            .map(|(name, env)| Ok((name.clone(), expander.expand(name, env)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(DesiredState { environments })
    }

    /// Merges defaults, environment tags and computed keys; later keys win.
    fn merge_tags(
        &self,
        env_tags: &TagMap,
        name: &str,
        environment_tag: &str,
        instance_type: &str,
    ) -> TagMap {
        let mut tags = self.default_tags.clone();
        tags.extend(env_tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags.insert(TAG_NAME.to_string(), name.to_string());
        tags.insert(TAG_ENVIRONMENT.to_string(), environment_tag.to_string());
        tags.insert(TAG_TYPE.to_string(), instance_type.to_string());
        tags
    }
}

/// Picks the instance type for a zero-based index.
fn select_instance_type(policy: AllocationPolicy, pool: &[String], index: usize, count: usize) -> &str {
    match policy {
        AllocationPolicy::Split => {
            if index < count / 2 {
                &pool[0]
            } else {
                &pool[1]
            }
        }
        AllocationPolicy::Cycle => &pool[index % pool.len()],
        AllocationPolicy::Constant => &pool[0],
    }
}

fn expansion_error(environment: &str, reason: String) -> crate::error::FleetformError {
    PlanError::Expansion {
        environment: environment.to_string(),
        reason,
    }
    .into()
}

impl DesiredState {
    /// Returns the resources of one environment, or an empty slice.
    #[must_use]
    pub fn environment(&self, name: &str) -> &[ResourceSpec] {
        self.environments.get(name).map_or(&[], Vec::as_slice)
    }

    /// Iterates environments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ResourceSpec])> {
        self.environments
            .iter()
            .map(|(name, resources)| (name.as_str(), resources.as_slice()))
    }

    /// Returns every desired resource, environments in name order.
    #[must_use]
    pub fn all(&self) -> Vec<ResourceSpec> {
        self.environments.values().flatten().cloned().collect()
    }

    /// Returns the total number of desired resources.
    #[must_use]
    pub fn total(&self) -> usize {
        self.environments.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<ResourceSpec>)> for DesiredState {
    fn from_iter<I: IntoIterator<Item = (String, Vec<ResourceSpec>)>>(iter: I) -> Self {
        Self {
            environments: iter.into_iter().collect(),
        }
    }
}

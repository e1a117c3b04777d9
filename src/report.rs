//! Fleet reporting.
//!
//! Projects the desired and observed resource sets into the reporting
//! shapes exposed by `apply` and `show`. Summarizing never touches the
//! provider and never mutates its inputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::planner::DesiredState;
use crate::provider::ObservedResource;

/// Totals for the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    /// Desired resources across all environments.
    pub total: usize,
    /// Desired resources per environment.
    pub counts_by_env: BTreeMap<String, usize>,
    /// Region the fleet lives in.
    pub region: String,
}

/// The reporting shapes for one fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetReport {
    /// Fleet totals.
    pub summary: FleetSummary,
    /// Every provider id, environments in name order.
    pub ids: Vec<String>,
    /// First resource name per environment; `null` for an empty environment.
    pub samples: BTreeMap<String, Option<String>>,
    /// Provider ids grouped by environment, in desired order.
    pub ids_by_env: BTreeMap<String, Vec<String>>,
}

impl FleetReport {
    /// Builds the report for a desired state and what the provider reports.
    ///
    /// Ids come from observed resources matched by name; desired resources
    /// that do not exist yet contribute no id.
    #[must_use]
    pub fn summarize(desired: &DesiredState, observed: &[ObservedResource], region: &str) -> Self {
        let mut ids_by_name: HashMap<&str, &str> = HashMap::with_capacity(observed.len());
        for resource in observed {
            // Lowest id wins for duplicated names, matching the differ.
            ids_by_name
                .entry(resource.name.as_str())
                .and_modify(|id| {
                    if resource.id.as_str() < *id {
                        *id = resource.id.as_str();
                    }
                })
                .or_insert(resource.id.as_str());
        }

        let mut report = Self {
            summary: FleetSummary {
                total: desired.total(),
                counts_by_env: BTreeMap::new(),
                region: region.to_string(),
            },
            ..Self::default()
        };

        for (env, resources) in desired.iter() {
            let ids: Vec<String> = resources
                .iter()
                .filter_map(|r| ids_by_name.get(r.name.as_str()).map(|id| (*id).to_string()))
                .collect();

            report.summary.counts_by_env.insert(env.to_string(), resources.len());
            report
                .samples
                .insert(env.to_string(), resources.first().map(|r| r.name.clone()));
            report.ids.extend(ids.iter().cloned());
            report.ids_by_env.insert(env.to_string(), ids);
        }

        report
    }

    /// Returns the number of desired resources that have a provider id.
    #[must_use]
    pub fn provisioned(&self) -> usize {
        self.ids.len()
    }
}

//! Diff engine for comparing desired vs observed state.
//!
//! Resources are matched by name. Buckets are sorted by name with ties
//! broken by id, so identical inputs produce byte-identical plans.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::provider::{ObservedResource, ResourceSpec};

use super::plan::{ChangePlan, FieldChange, ResourceUpdate};

/// Field path for the instance type.
const FIELD_INSTANCE_TYPE: &str = "instance_type";

/// Engine for computing diffs between desired and observed states.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the plan that turns `observed` into `desired`.
    #[must_use]
    pub fn diff(&self, desired: &[ResourceSpec], observed: &[ObservedResource]) -> ChangePlan {
        let mut plan = ChangePlan::default();

        // Several observed resources can share a name after a flaky create.
        // The lowest id is matched and the rest are removed.
        let mut observed_by_name: BTreeMap<&str, Vec<&ObservedResource>> = BTreeMap::new();
        for resource in observed {
            observed_by_name.entry(resource.name.as_str()).or_default().push(resource);
        }
        for group in observed_by_name.values_mut() {
            group.sort_by(|a, b| a.id.cmp(&b.id));
            for duplicate in group.iter().skip(1) {
                warn!(
                    "Duplicate resource name {} (ID: {}), scheduling removal",
                    duplicate.name, duplicate.id
                );
                plan.deletes.push((*duplicate).clone());
            }
        }

        let desired_names: BTreeSet<&str> = desired.iter().map(|r| r.name.as_str()).collect();

        for spec in desired {
            let Some(current) = observed_by_name.get(spec.name.as_str()).and_then(|g| g.first())
            else {
                debug!("{} needs to be created", spec.name);
                plan.creates.push(spec.clone());
                continue;
            };

            let changes = Self::compare(spec, current);
            if changes.is_empty() {
                plan.unchanged.push((*current).clone());
                continue;
            }

            let update = ResourceUpdate {
                name: spec.name.clone(),
                id: current.id.clone(),
                desired: spec.clone(),
                changes,
            };
            if update.is_conflict() {
                warn!(
                    "{} has both in-place and replacement changes, resolving as replace",
                    spec.name
                );
            }
            debug!("{} needs {}", spec.name, update.action_kind());
            plan.updates.push(update);
        }

        for (name, group) in &observed_by_name {
            if !desired_names.contains(name)
                && let Some(orphan) = group.first()
            {
                debug!("Found orphaned resource: {name}");
                plan.deletes.push((*orphan).clone());
            }
        }

        plan.creates.sort_by(|a, b| a.name.cmp(&b.name));
        plan.updates
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        plan.deletes
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        plan.unchanged
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        plan
    }

    /// Lists the attribute differences between a desired and an observed resource.
    fn compare(desired: &ResourceSpec, observed: &ObservedResource) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        if desired.instance_type != observed.instance_type {
            changes.push(FieldChange {
                field: FIELD_INSTANCE_TYPE.to_string(),
                old: Some(observed.instance_type.clone()),
                new: Some(desired.instance_type.clone()),
                requires_replacement: true,
            });
        }

        let keys: BTreeSet<&String> = desired.tags.keys().chain(observed.tags.keys()).collect();
        for key in keys {
            let old = observed.tags.get(key);
            let new = desired.tags.get(key);
            if old != new {
                changes.push(FieldChange {
                    field: format!("tags.{key}"),
                    old: old.cloned(),
                    new: new.cloned(),
                    requires_replacement: false,
                });
            }
        }

        changes
    }
}

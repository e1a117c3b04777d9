//! Change plan types and construction.
//!
//! A plan is the four-bucket result of a diff. It is turned into an ordered
//! list of actions for the executor, and fingerprinted so that a reviewed
//! plan can be matched against the one that is applied.

use serde::{Deserialize, Serialize};

use crate::config::ConfigHasher;
use crate::error::{FleetformError, Result};
use crate::provider::{ObservedResource, ResourceSpec};

/// Result of comparing desired and observed resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePlan {
    /// Desired resources with no observed counterpart.
    pub creates: Vec<ResourceSpec>,
    /// Matched resources whose attributes drifted.
    pub updates: Vec<ResourceUpdate>,
    /// Observed resources with no desired counterpart.
    pub deletes: Vec<ObservedResource>,
    /// Matched resources that already converge.
    pub unchanged: Vec<ObservedResource>,
}

/// A matched resource that needs changing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    /// Resource name.
    pub name: String,
    /// Provider id of the observed resource.
    pub id: String,
    /// Desired form of the resource.
    pub desired: ResourceSpec,
    /// Every attribute that differs.
    pub changes: Vec<FieldChange>,
}

/// A single attribute difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field path (`instance_type` or `tags.<key>`).
    pub field: String,
    /// Observed value, absent for an added tag.
    pub old: Option<String>,
    /// Desired value, absent for a removed tag.
    pub new: Option<String>,
    /// Whether the change can only be applied by destroying and recreating.
    pub requires_replacement: bool,
}

/// Kind of provider work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Destroy an unmatched observed resource.
    Delete,
    /// Destroy then recreate a resource.
    Replace,
    /// Create a missing resource.
    Create,
    /// Rewrite the tags of a resource in place.
    UpdateTags,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Action kind.
    pub kind: ActionKind,
    /// Resource name.
    pub name: String,
    /// Provider id of the existing resource, if any.
    pub id: Option<String>,
    /// Desired resource, absent for deletes.
    pub spec: Option<ResourceSpec>,
}

impl ResourceUpdate {
    /// Returns true if any change forces a replacement.
    #[must_use]
    pub fn requires_replacement(&self) -> bool {
        self.changes.iter().any(|c| c.requires_replacement)
    }

    /// Returns true if the update mixes in-place and replacement changes.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.requires_replacement() && self.changes.iter().any(|c| !c.requires_replacement)
    }

    /// Returns the action kind used to apply this update.
    #[must_use]
    pub fn action_kind(&self) -> ActionKind {
        if self.requires_replacement() {
            ActionKind::Replace
        } else {
            ActionKind::UpdateTags
        }
    }
}

impl ChangePlan {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Returns the number of resources that need work.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Returns the number of updates applied by replacement.
    #[must_use]
    pub fn replace_count(&self) -> usize {
        self.updates.iter().filter(|u| u.requires_replacement()).count()
    }

    /// Returns the number of updates applied in place.
    #[must_use]
    pub fn tag_update_count(&self) -> usize {
        self.updates.len() - self.replace_count()
    }

    /// Returns the actions in execution order: deletes, replacements,
    /// creates, then tag updates.
    #[must_use]
    pub fn actions(&self) -> Vec<PlannedAction> {
        let deletes = self.deletes.iter().map(|r| PlannedAction {
            kind: ActionKind::Delete,
            name: r.name.clone(),
            id: Some(r.id.clone()),
            spec: None,
        });

        let replaces = self
            .updates
            .iter()
            .filter(|u| u.requires_replacement())
            .map(PlannedAction::from_update);

        let creates = self.creates.iter().map(|spec| PlannedAction {
            kind: ActionKind::Create,
            name: spec.name.clone(),
            id: None,
            spec: Some(spec.clone()),
        });

        let tag_updates = self
            .updates
            .iter()
            .filter(|u| !u.requires_replacement())
            .map(PlannedAction::from_update);

        deletes.chain(replaces).chain(creates).chain(tag_updates).collect()
    }

    /// Serializes the plan to its canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| FleetformError::internal(format!("Failed to serialize plan: {e}")))
    }

    /// Computes the SHA-256 fingerprint of the canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(ConfigHasher::new().hash_bytes(&self.to_canonical_json()?))
    }
}

impl PlannedAction {
    fn from_update(update: &ResourceUpdate) -> Self {
        Self {
            kind: update.action_kind(),
            name: update.name.clone(),
            id: Some(update.id.clone()),
            spec: Some(update.desired.clone()),
        }
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.kind {
            ActionKind::Delete => format!("Destroy '{}'", self.name),
            ActionKind::Replace => format!("Replace '{}'", self.name),
            ActionKind::Create => format!("Create '{}'", self.name),
            ActionKind::UpdateTags => format!("Update tags on '{}'", self.name),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::Create => "create",
            Self::UpdateTags => "update-tags",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field,
            self.old.as_deref().unwrap_or("(none)"),
            self.new.as_deref().unwrap_or("(none)")
        )?;
        if self.requires_replacement {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.name)?;
        if let Some(id) = &self.id {
            write!(f, " [{id}]")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ChangePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required ({} unchanged)", self.unchanged.len());
        }

        writeln!(
            f,
            "Plan: {} to create, {} to replace, {} to update in place, {} to destroy",
            self.creates.len(),
            self.replace_count(),
            self.tag_update_count(),
            self.deletes.len()
        )?;
        for (i, action) in self.actions().iter().enumerate() {
            writeln!(f, "  {}. {action}", i + 1)?;
        }
        Ok(())
    }
}

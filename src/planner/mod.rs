//! Planning module for provisioning operations.
//!
//! This module expands configuration into desired resources, compares them
//! with observed resources, and applies the resulting change plan.

mod expand;
mod diff;
mod plan;
mod executor;

pub use expand::{DesiredState, ResourceExpander};
pub use diff::DiffEngine;
pub use plan::{ActionKind, ChangePlan, FieldChange, PlannedAction, ResourceUpdate};
pub use executor::{ActionResult, ActionStatus, ExecutionReport, PlanExecutor};

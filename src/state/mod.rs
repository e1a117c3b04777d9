//! State management module for the provisioning engine.
//!
//! This module provides persistent storage for the last plan, the last
//! execution, the fleet report taken after it, and a bounded history.

mod store;
mod local;
mod types;

pub use store::StateStore;
pub use local::LocalStateStore;
pub use types::{ExecutionRecord, FleetState, HistoryEntry, Operation, PlanRecord, STATE_VERSION};

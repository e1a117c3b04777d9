//! State types for recording plans and executions.
//!
//! The state file is informational: desired state is always recomputed from
//! configuration and observed state is always fetched from the provider.
//! What is kept here lets `show` answer "what was planned, what was applied,
//! and what did the fleet look like afterwards".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};
use crate::planner::{ChangePlan, ExecutionReport};
use crate::report::FleetReport;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete recorded state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetState {
    /// State format version.
    pub version: String,
    /// Hash of the configuration last planned.
    pub config_hash: String,
    /// Most recent plan.
    #[serde(default)]
    pub last_plan: Option<PlanRecord>,
    /// Most recent execution.
    #[serde(default)]
    pub last_execution: Option<ExecutionRecord>,
    /// Fleet report taken after the most recent execution.
    #[serde(default)]
    pub last_report: Option<FleetReport>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A recorded plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    /// When the plan was computed.
    pub created_at: DateTime<Utc>,
    /// Configuration hash the plan is based on.
    pub config_hash: String,
    /// SHA-256 of the serialized plan.
    pub fingerprint: String,
    /// The plan itself.
    pub plan: ChangePlan,
}

/// A recorded execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
    /// Fingerprint of the plan that was applied first.
    pub fingerprint: String,
    /// Attempts made.
    pub attempts: u32,
    /// Whether the fleet converged.
    pub converged: bool,
    /// Report of the last attempt.
    pub report: ExecutionReport,
}

/// A single entry in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation happened.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Configuration hash at the time.
    pub config_hash: String,
    /// Number of resources that needed work.
    pub changes: usize,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A plan was computed.
    Plan,
    /// A plan was applied.
    Apply,
}

impl FleetState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            config_hash: String::new(),
            last_plan: None,
            last_execution: None,
            last_report: None,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Checks that the state was written by a compatible version.
    ///
    /// # Errors
    ///
    /// Returns `StateError::VersionMismatch` for any other version.
    pub fn check_version(&self) -> Result<()> {
        if self.version == STATE_VERSION {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into())
        }
    }

    /// Records a freshly computed plan.
    pub fn record_plan(&mut self, record: PlanRecord) {
        self.config_hash.clone_from(&record.config_hash);
        self.add_history(HistoryEntry::new(
            Operation::Plan,
            &record.config_hash,
            record.plan.change_count(),
        ));
        self.last_plan = Some(record);
        self.last_updated = Utc::now();
    }

    /// Records an execution and the fleet report taken after it.
    pub fn record_execution(&mut self, record: ExecutionRecord, report: FleetReport) {
        let changes = record.report.results.len();
        let entry = if record.converged {
            HistoryEntry::new(Operation::Apply, &self.config_hash, changes)
        } else {
            HistoryEntry::failed(
                Operation::Apply,
                &self.config_hash,
                changes,
                &format!(
                    "{} failed, {} pending",
                    record.report.failed(),
                    record.report.pending()
                ),
            )
        };
        self.add_history(entry);
        self.last_execution = Some(record);
        self.last_report = Some(report);
        self.last_updated = Utc::now();
    }

    /// Adds a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: Operation, config_hash: &str, changes: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            changes,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: Operation, config_hash: &str, changes: usize, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, config_hash, changes)
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_record(hash: &str) -> PlanRecord {
        PlanRecord {
            created_at: Utc::now(),
            config_hash: hash.to_string(),
            fingerprint: String::from("f00d"),
            plan: ChangePlan::default(),
        }
    }

    #[test]
    fn test_record_plan_updates_hash_and_history() {
        let mut state = FleetState::new();
        state.record_plan(plan_record("abc"));

        assert_eq!(state.config_hash, "abc");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].operation, Operation::Plan);
        assert!(state.last_plan.is_some());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = FleetState::new();
        for i in 0..(MAX_HISTORY + 5) {
            state.add_history(HistoryEntry::new(Operation::Plan, &i.to_string(), 0));
        }

        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].config_hash, "5");
    }

    #[test]
    fn test_failed_execution_is_recorded() {
        let mut state = FleetState::new();
        let record = ExecutionRecord {
            finished_at: Utc::now(),
            fingerprint: String::from("f00d"),
            attempts: 2,
            converged: false,
            report: ExecutionReport::default(),
        };

        state.record_execution(record, FleetReport::default());

        let last = state.history.last().unwrap();
        assert!(!last.success);
        assert_eq!(last.error.as_deref(), Some("0 failed, 0 pending"));
        assert!(state.last_report.is_some());
    }

    #[test]
    fn test_version_check() {
        let mut state = FleetState::new();
        assert!(state.check_version().is_ok());

        state.version = String::from("0.9");
        assert!(state.check_version().is_err());
    }
}

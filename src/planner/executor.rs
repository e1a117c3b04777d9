//! Plan executor for applying change plans.
//!
//! Actions run phase by phase (deletes, replacements, creates, tag updates).
//! Inside a phase they are issued in concurrent batches, every provider call
//! is bounded by a timeout, and a failure only affects its own resource.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::error::{FleetformError, ProviderError, Result};
use crate::provider::{Provider, ResourceSpec};

use super::plan::{ActionKind, ChangePlan, PlannedAction};

/// Executor for change plans.
pub struct PlanExecutor<'a> {
    /// Provider the actions are issued against.
    provider: &'a dyn Provider,
    /// Bound on every provider call.
    timeout: Duration,
    /// Number of actions issued concurrently.
    batch_size: usize,
    /// Pause between batches.
    batch_delay: Duration,
    /// Whether deletes are carried out.
    prune: bool,
    /// Whether to stop after the first failed batch.
    fail_fast: bool,
}

/// Outcome of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The provider accepted the change.
    Succeeded,
    /// The provider call failed or timed out.
    Failed,
    /// The action was never attempted.
    Pending,
    /// The delete was withheld because pruning is off.
    Skipped,
}

/// Result of executing a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action kind.
    pub kind: ActionKind,
    /// Resource name.
    pub name: String,
    /// Outcome.
    pub status: ActionStatus,
    /// Provider id of the resulting (or removed) resource.
    pub resource_id: Option<String>,
    /// Error message, for failed actions.
    pub error: Option<String>,
}

/// Per-resource report of one plan execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Results in execution order.
    pub results: Vec<ActionResult>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor tuned by `execution`.
    #[must_use]
    pub fn new(provider: &'a dyn Provider, execution: &ExecutionConfig) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(execution.timeout_secs),
            batch_size: execution.batch_size.max(1),
            batch_delay: Duration::from_millis(execution.batch_delay_ms),
            prune: execution.prune,
            fail_fast: execution.fail_fast,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes a plan.
    ///
    /// Never fails as a whole: every provider error is recorded against the
    /// action that caused it.
    pub async fn execute(&self, plan: &ChangePlan) -> ExecutionReport {
        let actions = plan.actions();
        info!(
            "Executing plan with {} action(s) in batches of {}",
            actions.len(),
            self.batch_size
        );

        let mut results = Vec::with_capacity(actions.len());
        let mut halted = false;
        let mut batches_issued = 0_usize;

        for phase in [ActionKind::Delete, ActionKind::Replace, ActionKind::Create, ActionKind::UpdateTags] {
            let phase_actions: Vec<&PlannedAction> =
                actions.iter().filter(|a| a.kind == phase).collect();
            if phase_actions.is_empty() {
                continue;
            }

            if phase == ActionKind::Delete && !self.prune {
                info!("Pruning disabled, skipping {} delete(s)", phase_actions.len());
                results.extend(
                    phase_actions
                        .iter()
                        .map(|a| ActionResult::unattempted(a, ActionStatus::Skipped)),
                );
                continue;
            }

            debug!("Phase {phase}: {} action(s)", phase_actions.len());
            for batch in phase_actions.chunks(self.batch_size) {
                if halted {
                    results.extend(
                        batch
                            .iter()
                            .map(|a| ActionResult::unattempted(a, ActionStatus::Pending)),
                    );
                    continue;
                }

                if batches_issued > 0 && !self.batch_delay.is_zero() {
                    tokio::time::sleep(self.batch_delay).await;
                }
                batches_issued += 1;

                let batch_results = join_all(batch.iter().map(|a| self.run_action(a))).await;
                let batch_failed = batch_results.iter().any(|r| r.status == ActionStatus::Failed);
                results.extend(batch_results);

                if batch_failed && self.fail_fast {
                    warn!("Batch failed with fail-fast enabled, leaving remaining actions pending");
                    halted = true;
                }
            }
        }

        let report = ExecutionReport { results };
        info!("{report}");
        report
    }

    /// Runs one action and records its outcome.
    async fn run_action(&self, action: &PlannedAction) -> ActionResult {
        info!("{}", action.description());

        let outcome = match action.kind {
            ActionKind::Delete => self.destroy(action).await,
            ActionKind::Replace => self.replace(action).await,
            ActionKind::Create => self.create(action).await,
            ActionKind::UpdateTags => self.update_tags(action).await,
        };

        match outcome {
            Ok(resource_id) => ActionResult {
                kind: action.kind,
                name: action.name.clone(),
                status: ActionStatus::Succeeded,
                resource_id,
                error: None,
            },
            Err(e) => {
                error!("Failed to {} {}: {e}", action.kind, action.name);
                ActionResult {
                    kind: action.kind,
                    name: action.name.clone(),
                    status: ActionStatus::Failed,
                    resource_id: action.id.clone(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn create(&self, action: &PlannedAction) -> Result<Option<String>> {
        let spec = required_spec(action)?;
        let id = self
            .bounded("create_resource", &action.name, self.provider.create_resource(spec))
            .await?;
        info!("Created {} (ID: {id})", action.name);
        Ok(Some(id))
    }

    async fn destroy(&self, action: &PlannedAction) -> Result<Option<String>> {
        let id = required_id(action)?;
        match self
            .bounded("destroy_resource", &action.name, self.provider.destroy_resource(id))
            .await
        {
            Ok(()) => info!("Destroyed {} (ID: {id})", action.name),
            Err(FleetformError::Provider(ProviderError::ResourceNotFound { .. })) => {
                info!("{} (ID: {id}) was already gone", action.name);
            }
            Err(e) => return Err(e),
        }
        Ok(Some(id.to_string()))
    }

    async fn replace(&self, action: &PlannedAction) -> Result<Option<String>> {
        self.destroy(action).await?;
        self.create(action).await
    }

    async fn update_tags(&self, action: &PlannedAction) -> Result<Option<String>> {
        let id = required_id(action)?;
        let spec = required_spec(action)?;
        self.bounded("update_tags", &action.name, self.provider.update_tags(id, &spec.tags))
            .await?;
        info!("Updated tags on {} (ID: {id})", action.name);
        Ok(Some(id.to_string()))
    }

    /// Bounds a provider call by the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &str,
        target: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            FleetformError::from(ProviderError::timeout(operation, target, self.timeout.as_secs()))
        })?
    }
}

fn required_id(action: &PlannedAction) -> Result<&str> {
    action
        .id
        .as_deref()
        .ok_or_else(|| FleetformError::internal(format!("{} action for {} has no id", action.kind, action.name)))
}

fn required_spec(action: &PlannedAction) -> Result<&ResourceSpec> {
    action
        .spec
        .as_ref()
        .ok_or_else(|| FleetformError::internal(format!("{} action for {} has no spec", action.kind, action.name)))
}

impl ActionResult {
    fn unattempted(action: &PlannedAction, status: ActionStatus) -> Self {
        Self {
            kind: action.kind,
            name: action.name.clone(),
            status,
            resource_id: action.id.clone(),
            error: None,
        }
    }
}

impl ExecutionReport {
    fn count(&self, status: ActionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    fn names(&self, status: ActionStatus) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Returns the number of succeeded actions.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(ActionStatus::Succeeded)
    }

    /// Returns the number of failed actions.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ActionStatus::Failed)
    }

    /// Returns the number of actions never attempted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.count(ActionStatus::Pending)
    }

    /// Returns the number of deletes withheld by the prune setting.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(ActionStatus::Skipped)
    }

    /// Returns the names of failed resources.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.names(ActionStatus::Failed)
    }

    /// Returns the names of pending resources.
    #[must_use]
    pub fn pending_names(&self) -> Vec<&str> {
        self.names(ActionStatus::Pending)
    }

    /// Returns true if nothing failed and nothing is pending.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed() == 0 && self.pending() == 0
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} action(s): {} succeeded, {} failed, {} pending, {} skipped",
            self.results.len(),
            self.succeeded(),
            self.failed(),
            self.pending(),
            self.skipped()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{FieldChange, ResourceUpdate};
    use crate::provider::{ObservedResource, TagMap};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[allow(dead_code, missing_docs)]
    mod doubles {
        use super::*;
        use async_trait::async_trait;
        use mockall::mock;

        mock! {
            pub Cloud {}

            #[async_trait]
            impl Provider for Cloud {
                async fn list_resources(&self, name_prefix: &str) -> Result<Vec<ObservedResource>>;
                async fn create_resource(&self, spec: &ResourceSpec) -> Result<String>;
                async fn update_tags(&self, id: &str, tags: &TagMap) -> Result<()>;
                async fn destroy_resource(&self, id: &str) -> Result<()>;
                fn provider_name(&self) -> &'static str;
            }
        }

        /// Provider whose creates hang for names listed in `slow`.
        pub struct SlowCloud {
            pub slow: Vec<String>,
        }

        #[async_trait]
        impl Provider for SlowCloud {
            async fn list_resources(&self, _name_prefix: &str) -> Result<Vec<ObservedResource>> {
                Ok(Vec::new())
            }

            async fn create_resource(&self, spec: &ResourceSpec) -> Result<String> {
                if self.slow.contains(&spec.name) {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(format!("i-{}", spec.name))
            }

            async fn update_tags(&self, _id: &str, _tags: &TagMap) -> Result<()> {
                Ok(())
            }

            async fn destroy_resource(&self, _id: &str) -> Result<()> {
                Ok(())
            }

            fn provider_name(&self) -> &'static str {
                "slow"
            }
        }
    }

    use doubles::{MockCloud, SlowCloud};

    fn spec(name: &str) -> ResourceSpec {
        ResourceSpec {
            name: name.to_string(),
            environment: String::from("dev"),
            instance_type: String::from("t3.micro"),
            tags: TagMap::from([(String::from("Name"), name.to_string())]),
        }
    }

    fn creates(names: &[&str]) -> ChangePlan {
        ChangePlan {
            creates: names.iter().map(|n| spec(n)).collect(),
            ..ChangePlan::default()
        }
    }

    fn execution(batch_size: usize, fail_fast: bool) -> ExecutionConfig {
        ExecutionConfig {
            batch_size,
            fail_fast,
            ..ExecutionConfig::default()
        }
    }

    fn status_of<'r>(report: &'r ExecutionReport, name: &str) -> &'r ActionResult {
        report.results.iter().find(|r| r.name == name).unwrap()
    }

    #[tokio::test]
    async fn test_failed_create_does_not_abort_siblings() {
        let mut cloud = MockCloud::new();
        cloud.expect_create_resource().times(3).returning(|spec| {
            if spec.name == "dev-02" {
                Err(ProviderError::request("capacity exhausted").into())
            } else {
                Ok(format!("i-{}", spec.name))
            }
        });

        let executor = PlanExecutor::new(&cloud, &execution(10, false));
        let report = executor.execute(&creates(&["dev-01", "dev-02", "dev-03"])).await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed_names(), vec!["dev-02"]);
        assert!(status_of(&report, "dev-02").error.as_deref().unwrap().contains("capacity"));
        assert_eq!(status_of(&report, "dev-03").resource_id.as_deref(), Some("i-dev-03"));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_fail_fast_leaves_rest_pending() {
        let mut cloud = MockCloud::new();
        cloud
            .expect_create_resource()
            .times(1)
            .returning(|_| Err(ProviderError::request("boom").into()));

        let executor = PlanExecutor::new(&cloud, &execution(1, true));
        let report = executor.execute(&creates(&["dev-01", "dev-02", "dev-03"])).await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.pending_names(), vec!["dev-02", "dev-03"]);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_action() {
        let cloud = SlowCloud {
            slow: vec![String::from("dev-02")],
        };

        let executor = PlanExecutor::new(&cloud, &execution(10, false))
            .with_timeout(Duration::from_millis(100));
        let report = executor.execute(&creates(&["dev-01", "dev-02", "dev-03"])).await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(status_of(&report, "dev-02").status, ActionStatus::Failed);
        assert!(status_of(&report, "dev-02").error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_batches_are_spaced_by_delay() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let mut cloud = MockCloud::new();
        cloud.expect_create_resource().times(3).returning(move |spec| {
            seen.lock().unwrap().push(Instant::now());
            Ok(format!("i-{}", spec.name))
        });

        let config = ExecutionConfig {
            batch_delay_ms: 50,
            ..execution(1, false)
        };
        let started = Instant::now();
        let report = PlanExecutor::new(&cloud, &config)
            .execute(&creates(&["dev-01", "dev-02", "dev-03"]))
            .await;

        assert_eq!(report.succeeded(), 3);
        assert!(started.elapsed() >= Duration::from_millis(100));
        let stamps = calls.lock().unwrap();
        assert!(stamps[0] - started < Duration::from_millis(50));
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_prune_off_skips_deletes() {
        let mut cloud = MockCloud::new();
        cloud.expect_destroy_resource().never();

        let mut config = execution(10, false);
        config.prune = false;
        let plan = ChangePlan {
            deletes: vec![ObservedResource::from_spec(&spec("dev-09"), "i-9")],
            ..ChangePlan::default()
        };

        let report = PlanExecutor::new(&cloud, &config).execute(&plan).await;

        assert_eq!(report.skipped(), 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_replace_destroys_then_creates() {
        let mut cloud = MockCloud::new();
        let mut sequence = mockall::Sequence::new();
        cloud
            .expect_destroy_resource()
            .withf(|id| id == "i-old")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        cloud
            .expect_create_resource()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(String::from("i-new")));

        let plan = ChangePlan {
            updates: vec![ResourceUpdate {
                name: String::from("dev-01"),
                id: String::from("i-old"),
                desired: spec("dev-01"),
                changes: vec![FieldChange {
                    field: String::from("instance_type"),
                    old: Some(String::from("t3.large")),
                    new: Some(String::from("t3.micro")),
                    requires_replacement: true,
                }],
            }],
            ..ChangePlan::default()
        };

        let report = PlanExecutor::new(&cloud, &execution(10, false)).execute(&plan).await;

        assert_eq!(report.results[0].kind, ActionKind::Replace);
        assert_eq!(report.results[0].resource_id.as_deref(), Some("i-new"));
    }

    #[tokio::test]
    async fn test_delete_of_missing_resource_succeeds() {
        let mut cloud = MockCloud::new();
        cloud.expect_destroy_resource().times(1).returning(|id| {
            Err(ProviderError::ResourceNotFound { id: id.to_string() }.into())
        });

        let plan = ChangePlan {
            deletes: vec![ObservedResource::from_spec(&spec("dev-09"), "i-9")],
            ..ChangePlan::default()
        };

        let report = PlanExecutor::new(&cloud, &execution(10, false)).execute(&plan).await;

        assert_eq!(report.succeeded(), 1);
    }
}

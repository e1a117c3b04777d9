//! Reconciler for converging the fleet on its desired state.
//!
//! One cycle validates the configuration, expands it, observes the provider,
//! diffs, and optionally executes the plan. Every retry re-observes and
//! re-diffs, so later attempts only act on what is still unconverged.

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ConfigHasher, ConfigValidator, ExecutionConfig, FleetConfig};
use crate::error::{ReconcileError, Result};
use crate::planner::{ChangePlan, DesiredState, DiffEngine, ExecutionReport, PlanExecutor, ResourceExpander};
use crate::provider::{ObservedResource, Provider, ResourceObserver};
use crate::report::FleetReport;
use crate::state::{ExecutionRecord, FleetState, PlanRecord, StateStore};

/// Default pause between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Reconciler for maintaining desired state.
pub struct Reconciler<'a, S: StateStore> {
    /// Configuration.
    config: &'a FleetConfig,
    /// State store.
    state_store: &'a S,
    /// Provider to reconcile against.
    provider: &'a dyn Provider,
    /// Configuration hasher.
    hasher: ConfigHasher,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Execution tuning, seeded from the configuration.
    execution: ExecutionConfig,
    /// Pause between attempts.
    retry_delay: Duration,
}

/// A computed plan together with the inputs it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    /// Hash of the configuration.
    pub config_hash: String,
    /// SHA-256 of the serialized plan.
    pub fingerprint: String,
    /// Non-fatal validation findings.
    pub warnings: Vec<String>,
    /// Desired resources per environment.
    pub desired: DesiredState,
    /// Resources the provider reported.
    pub observed: Vec<ObservedResource>,
    /// The plan.
    pub plan: ChangePlan,
}

/// Result of an apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Whether the fleet converged.
    pub converged: bool,
    /// Attempts made.
    pub attempts: u32,
    /// Fingerprint of the first plan.
    pub fingerprint: String,
    /// The first plan.
    pub plan: ChangePlan,
    /// One report per executed attempt.
    pub executions: Vec<ExecutionReport>,
    /// Fleet report taken after the last attempt.
    pub report: FleetReport,
    /// Why the final observation failed; the report then reflects the
    /// last successful one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_error: Option<String>,
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(config: &'a FleetConfig, state_store: &'a S, provider: &'a dyn Provider) -> Self {
        Self {
            config,
            state_store,
            provider,
            hasher: ConfigHasher::new(),
            diff_engine: DiffEngine::new(),
            execution: config.execution.clone(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the execution tuning.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Validates, expands, observes and diffs, then records the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if validation, expansion, observation or saving
    /// the state fails. Validation runs before any provider call.
    pub async fn plan(&self) -> Result<PlanOutcome> {
        info!(
            "Planning {} environment(s) in {}",
            self.config.environments.len(),
            self.config.global.region
        );

        let validation = ConfigValidator::for_config(self.config)?.validate_config(self.config)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let config_hash = self.hasher.hash_config(self.config);
        let desired = ResourceExpander::expand_all(self.config)?;
        let observed = self.observe().await?;

        let plan = self.diff_engine.diff(&desired.all(), &observed);
        let fingerprint = plan.fingerprint()?;
        info!(
            "Plan {}: {} create, {} replace, {} update, {} delete, {} unchanged",
            self.hasher.short_hash(&fingerprint),
            plan.creates.len(),
            plan.replace_count(),
            plan.tag_update_count(),
            plan.deletes.len(),
            plan.unchanged.len()
        );

        let mut state = self.load_state().await?;
        debug!("Recording plan in {} state store", self.state_store.backend_type());
        state.record_plan(PlanRecord {
            created_at: Utc::now(),
            config_hash: config_hash.clone(),
            fingerprint: fingerprint.clone(),
            plan: plan.clone(),
        });
        self.state_store.save(&state).await?;

        Ok(PlanOutcome {
            config_hash,
            fingerprint,
            warnings: validation.warnings,
            desired,
            observed,
            plan,
        })
    }

    /// Plans and applies, retrying up to `max_attempts` times.
    ///
    /// An incomplete run is not an error here: the result reports what is
    /// still failed or pending and [`ReconciliationResult::ensure_converged`]
    /// turns it into one.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails, if `expected_fingerprint` does not
    /// match the fresh plan, or if `max_attempts` is zero.
    pub async fn apply(&self, expected_fingerprint: Option<&str>) -> Result<ReconciliationResult> {
        if self.execution.max_attempts == 0 {
            return Err(ReconcileError::Aborted {
                reason: String::from("max_attempts is 0"),
            }
            .into());
        }

        let outcome = self.plan().await?;
        if let Some(expected) = expected_fingerprint
            && expected != outcome.fingerprint
        {
            return Err(ReconcileError::Aborted {
                reason: format!(
                    "plan changed since it was reviewed (expected {}, got {})",
                    self.hasher.short_hash(expected),
                    self.hasher.short_hash(&outcome.fingerprint)
                ),
            }
            .into());
        }

        let executor = PlanExecutor::new(self.provider, &self.execution);
        let desired_resources = outcome.desired.all();
        let mut plan = outcome.plan.clone();
        let mut observed = outcome.observed;
        let mut executions: Vec<ExecutionReport> = Vec::new();
        let mut attempts = 0;
        let mut converged = false;

        while attempts < self.execution.max_attempts {
            if attempts > 0 {
                if !self.retry_delay.is_zero() {
                    tokio::time::sleep(self.retry_delay).await;
                }
                match self.observe().await {
                    Ok(fresh) => {
                        plan = self.diff_engine.diff(&desired_resources, &fresh);
                        observed = fresh;
                    }
                    Err(e) if e.is_retryable() => {
                        attempts += 1;
                        warn!("Attempt {attempts} could not observe the fleet: {e}");
                        continue;
                    }
                    Err(e) => {
                        warn!("Giving up after {attempts} attempt(s), the fleet cannot be observed: {e}");
                        break;
                    }
                }
            }

            if plan.is_empty() {
                info!("No changes required - fleet is converged");
                converged = true;
                break;
            }

            attempts += 1;
            debug!("Reconciliation attempt {attempts}/{}", self.execution.max_attempts);

            let report = executor.execute(&plan).await;
            if report.is_complete() {
                executions.push(report);
                converged = true;
                break;
            }
            if attempts < self.execution.max_attempts {
                warn!(
                    "Attempt {attempts} left failed {:?} and pending {:?}, retrying",
                    report.failed_names(),
                    report.pending_names()
                );
            }
            executions.push(report);
        }

        // Executed changes are recorded even when the fleet cannot be read back.
        let mut observation_error = None;
        match self.observe().await {
            Ok(fresh) => observed = fresh,
            Err(e) => {
                warn!("Could not observe the fleet after applying, reporting the last known state: {e}");
                converged = false;
                observation_error = Some(e.to_string());
            }
        }
        let report = FleetReport::summarize(&outcome.desired, &observed, &self.config.global.region);

        let result = ReconciliationResult {
            converged,
            attempts,
            fingerprint: outcome.fingerprint,
            plan: outcome.plan,
            executions,
            report,
            observation_error,
        };
        self.record_result(&result).await?;

        Ok(result)
    }

    /// Observes every configured environment.
    async fn observe(&self) -> Result<Vec<ObservedResource>> {
        let observer =
            ResourceObserver::new(self.provider, Duration::from_secs(self.execution.timeout_secs));
        let observed = observer.fetch_all(&self.config.environments).await?;
        Ok(observed.into_values().flatten().collect())
    }

    async fn load_state(&self) -> Result<FleetState> {
        Ok(self.state_store.load().await?.unwrap_or_default())
    }

    async fn record_result(&self, result: &ReconciliationResult) -> Result<()> {
        let mut state = self.load_state().await?;
        state.record_execution(
            ExecutionRecord {
                finished_at: Utc::now(),
                fingerprint: result.fingerprint.clone(),
                attempts: result.attempts,
                converged: result.converged,
                report: result.last_execution().cloned().unwrap_or_default(),
            },
            result.report.clone(),
        );
        self.state_store.save(&state).await
    }
}

impl ReconciliationResult {
    /// Returns the report of the last executed attempt.
    #[must_use]
    pub fn last_execution(&self) -> Option<&ExecutionReport> {
        self.executions.last()
    }

    /// Turns an unconverged result into `ReconcileError::PartialFailure`.
    ///
    /// # Errors
    ///
    /// Returns an error if any action is still failed or pending.
    pub fn ensure_converged(&self) -> Result<()> {
        if self.converged {
            return Ok(());
        }
        let (failed, pending) = self
            .last_execution()
            .map_or((0, 0), |r| (r.failed(), r.pending()));
        Err(ReconcileError::PartialFailure {
            failed,
            pending,
            attempts: self.attempts,
        }
        .into())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.converged { "converged" } else { "incomplete" };
        writeln!(f, "Reconciliation {status} after {} attempt(s)", self.attempts)?;
        for (i, execution) in self.executions.iter().enumerate() {
            writeln!(f, "  Attempt {}: {execution}", i + 1)?;
        }
        if let Some(error) = &self.observation_error {
            writeln!(f, "  Fleet could not be observed: {error}")?;
        }
        write!(
            f,
            "  Fleet: {} of {} resource(s) provisioned",
            self.report.provisioned(),
            self.report.summary.total
        )
    }
}

//! Output formatting for CLI commands.
//!
//! Text goes to stderr alongside the logs; JSON goes to stdout so it can be
//! piped into other tools.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write as _;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, FleetConfig, ValidationReport};
use crate::error::Result;
use crate::planner::{ActionKind, ActionStatus, ChangePlan, ExecutionReport};
use crate::reconciler::{PlanOutcome, ReconciliationResult};
use crate::report::FleetReport;
use crate::state::FleetState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
    /// Hasher used to shorten hashes for display.
    hasher: ConfigHasher,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Environment row for fleet report display.
#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Desired")]
    desired: usize,
    #[tabled(rename = "Provisioned")]
    provisioned: usize,
    #[tabled(rename = "Sample")]
    sample: String,
}

/// Row for an action that did not succeed.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self {
            format,
            hasher: ConfigHasher::new(),
        }
    }

    /// Returns true if output is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Writes formatted output to the stream matching the format.
    ///
    /// # Errors
    ///
    /// Returns an error if stdout cannot be written.
    pub fn emit(&self, output: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(output.as_bytes())?;
                stdout.write_all(b"\n")?;
                stdout.flush()?;
            }
            OutputFormat::Text => eprintln!("{output}"),
        }
        Ok(())
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &FleetConfig,
        report: &ValidationReport,
        show_warnings: bool,
    ) -> String {
        if self.is_json() {
            return to_json(&serde_json::json!({
                "valid": true,
                "region": config.global.region,
                "environments": config.environment_names(),
                "total": config.total_count(),
                "warnings": report.warnings,
            }));
        }

        let mut output = format!("{} Configuration is valid\n", "✓".green());
        if show_warnings && !report.warnings.is_empty() {
            let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
            for warning in &report.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        } else if report.warning_count() > 0 {
            let _ = writeln!(
                output,
                "   {} warning(s), use --warnings to list them",
                report.warning_count()
            );
        }

        let _ = write!(output, "\nConfiguration summary:\n");
        let _ = writeln!(output, "   Region: {}", config.global.region);
        let _ = writeln!(output, "   AMI: {}", config.global.ami);
        for (name, env) in &config.environments {
            let _ = writeln!(
                output,
                "   {name}: {} x [{}] ({})",
                env.count,
                env.instance_types.join(", "),
                env.allocation
            );
        }
        let _ = writeln!(output, "   Total instances: {}", config.total_count());
        output
    }

    /// Formats a computed plan.
    #[must_use]
    pub fn format_plan(&self, outcome: &PlanOutcome, detailed: bool) -> String {
        if self.is_json() {
            return to_json(&PlanJson::from(outcome));
        }

        let plan = &outcome.plan;
        if plan.is_empty() {
            return format!(
                "{} No changes required - {} resource(s) up to date.\n",
                "✓".green(),
                plan.unchanged.len()
            );
        }

        let mut output = String::new();
        let _ = write!(output, "\nChange Plan\n");
        let _ = writeln!(output, "   Config hash: {}", self.hasher.short_hash(&outcome.config_hash));
        let _ = write!(output, "   Fingerprint: {}\n\n", outcome.fingerprint);

        output.push_str(&Self::plan_table(plan));
        output.push('\n');

        if detailed {
            for update in &plan.updates {
                let _ = writeln!(output, "\n   {} [{}]", update.name, update.id);
                for change in &update.changes {
                    let _ = writeln!(output, "     {change}");
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to replace, {} to update in place, {} to destroy, {} unchanged\n",
            plan.creates.len().to_string().green(),
            plan.replace_count().to_string().yellow(),
            plan.tag_update_count().to_string().yellow(),
            plan.deletes.len().to_string().red(),
            plan.unchanged.len()
        );
        output
    }

    fn plan_table(plan: &ChangePlan) -> String {
        let changes_by_name: std::collections::HashMap<&str, usize> = plan
            .updates
            .iter()
            .map(|u| (u.name.as_str(), u.changes.len()))
            .collect();

        let rows: Vec<PlanActionRow> = plan
            .actions()
            .into_iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_kind(a.kind),
                changes: changes_by_name
                    .get(a.name.as_str())
                    .map_or_else(String::new, |n| format!("{n} field(s)")),
                id: a.id.unwrap_or_default(),
                resource: a.name,
            })
            .collect();

        Table::new(rows).to_string()
    }

    /// Formats an apply result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        if self.is_json() {
            return to_json(result);
        }

        let status = if result.converged {
            format!("{} Fleet converged", "✓".green())
        } else {
            format!("{} Fleet did not converge", "✗".red())
        };

        let mut output = format!("{status} after {} attempt(s)\n", result.attempts);
        for (i, execution) in result.executions.iter().enumerate() {
            let _ = writeln!(output, "   Attempt {}: {execution}", i + 1);
        }

        if let Some(last) = result.last_execution() {
            output.push_str(&Self::format_outcomes(last));
        }

        if let Some(error) = &result.observation_error {
            let _ = writeln!(
                output,
                "\n{} Fleet could not be observed after applying: {error}",
                "!".yellow()
            );
            output.push_str("   The report below reflects the last successful observation.\n");
        }

        output.push('\n');
        output.push_str(&self.format_report(&result.report));
        output
    }

    /// Formats the actions of an execution that did not succeed.
    fn format_outcomes(report: &ExecutionReport) -> String {
        let rows: Vec<OutcomeRow> = report
            .results
            .iter()
            .filter(|r| r.status != ActionStatus::Succeeded)
            .map(|r| OutcomeRow {
                resource: r.name.clone(),
                action: r.kind.to_string(),
                status: Self::format_status(r.status),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();

        if rows.is_empty() {
            return String::new();
        }
        format!("\n{}\n", Table::new(rows))
    }

    /// Formats a fleet report.
    #[must_use]
    pub fn format_report(&self, report: &FleetReport) -> String {
        if self.is_json() {
            return to_json(report);
        }

        let rows: Vec<EnvironmentRow> = report
            .summary
            .counts_by_env
            .iter()
            .map(|(env, count)| EnvironmentRow {
                environment: env.clone(),
                desired: *count,
                provisioned: report.ids_by_env.get(env).map_or(0, Vec::len),
                sample: report
                    .samples
                    .get(env)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| String::from("-")),
            })
            .collect();

        let mut output = format!(
            "Fleet in {}: {} of {} provisioned\n",
            report.summary.region,
            report.provisioned(),
            report.summary.total
        );
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }
        output
    }

    /// Formats recorded state.
    #[must_use]
    pub fn format_state(&self, state: &FleetState, show_history: bool) -> String {
        if self.is_json() {
            return to_json(state);
        }

        let mut output = String::from("\nState\n\n");
        let _ = writeln!(output, "   Version: {}", state.version);
        let _ = writeln!(output, "   Config hash: {}", self.hasher.short_hash(&state.config_hash));
        let _ = writeln!(output, "   Last updated: {}", state.last_updated.format("%Y-%m-%d %H:%M:%S"));

        if let Some(record) = &state.last_plan {
            let _ = write!(
                output,
                "\n   Last plan ({}, {}):\n",
                record.created_at.format("%Y-%m-%d %H:%M"),
                self.hasher.short_hash(&record.fingerprint)
            );
            for line in record.plan.to_string().lines() {
                let _ = writeln!(output, "     {line}");
            }
        }

        if let Some(record) = &state.last_execution {
            let status = if record.converged { "✓".green() } else { "✗".red() };
            let _ = write!(
                output,
                "\n   Last apply: {status} {} after {} attempt(s)\n",
                record.report, record.attempts
            );
            output.push_str(&Self::format_outcomes(&record.report));
        }

        if let Some(report) = &state.last_report {
            output.push('\n');
            output.push_str(&self.format_report(report));
        }

        if show_history && !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(10) {
                let status = if entry.success { "✓".green() } else { "✗".red() };
                let _ = writeln!(
                    output,
                    "     {status} {} - {} ({} change(s)){}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.changes,
                    entry.error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
                );
            }
        }

        output
    }

    /// Formats an action kind with color.
    fn format_action_kind(kind: ActionKind) -> String {
        match kind {
            ActionKind::Create => "+create".green().to_string(),
            ActionKind::UpdateTags => "~update".yellow().to_string(),
            ActionKind::Replace => "-/+replace".yellow().to_string(),
            ActionKind::Delete => "-delete".red().to_string(),
        }
    }

    /// Formats an action status with color.
    fn format_status(status: ActionStatus) -> String {
        match status {
            ActionStatus::Succeeded => "succeeded".green().to_string(),
            ActionStatus::Failed => "failed".red().to_string(),
            ActionStatus::Pending => "pending".yellow().to_string(),
            ActionStatus::Skipped => "skipped".dimmed().to_string(),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson<'a> {
    config_hash: &'a str,
    fingerprint: &'a str,
    warnings: &'a [String],
    creates: usize,
    replaces: usize,
    updates: usize,
    deletes: usize,
    unchanged: usize,
    plan: &'a ChangePlan,
}

impl<'a> From<&'a PlanOutcome> for PlanJson<'a> {
    fn from(outcome: &'a PlanOutcome) -> Self {
        Self {
            config_hash: &outcome.config_hash,
            fingerprint: &outcome.fingerprint,
            warnings: &outcome.warnings,
            creates: outcome.plan.creates.len(),
            replaces: outcome.plan.replace_count(),
            updates: outcome.plan.tag_update_count(),
            deletes: outcome.plan.deletes.len(),
            unchanged: outcome.plan.unchanged.len(),
            plan: &outcome.plan,
        }
    }
}

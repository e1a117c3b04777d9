//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fleetform - declarative fleet provisioning.
#[derive(Parser, Debug)]
#[command(name = "fleetform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "FLEETFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration without contacting the provider.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compute and display the change plan.
    Plan {
        /// Show every field change of every update.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Compute and apply the change plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Leave everything after a failed batch pending.
        #[arg(long)]
        fail_fast: bool,

        /// Keep resources that are no longer in the configuration.
        #[arg(long)]
        no_prune: bool,

        /// Maximum reconciliation attempts (overrides the configuration).
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Refuse to apply unless the plan fingerprint matches.
        #[arg(long, value_name = "SHA256")]
        expect_fingerprint: Option<String>,
    },

    /// Show the last recorded plan, execution and fleet report.
    Show {
        /// Show history entries too.
        #[arg(long)]
        history: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

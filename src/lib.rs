// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Fleetform
//!
//! A declarative, idempotent provisioning engine for fixed fleets of virtual machines.
//!
//! ## Overview
//!
//! Fleetform turns a small YAML description of environments into a concrete
//! list of instances, compares it with what the provider reports, and applies
//! the minimal change plan:
//!
//! - Describe counts, instance type pools, naming and tagging per environment
//! - Validate every format constraint in one pass before touching the provider
//! - Review a deterministic, fingerprinted plan
//! - Apply it in rate-limited batches with per-resource failure isolation
//!
//! ## Architecture
//!
//! The system is built around **desired state reconciliation**:
//!
//! 1. **Desired State**: Expanded from `fleetform.yaml`
//! 2. **Observed State**: Listed from the provider, one environment prefix at a time
//! 3. **Reconciler**: Diffs the two and executes the resulting plan
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`planner`]: Expansion, diffing and plan execution
//! - [`provider`]: Provider contract, local provider and observer
//! - [`report`]: Fleet reporting shapes
//! - [`reconciler`]: State reconciliation engine
//! - [`state`]: Recorded plans, executions and history
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! global:
//!   region: us-east-1
//!   ami: ami-0123abcd
//!   default_tags:
//!     Owner: infra
//!
//! environments:
//!   dev:
//!     count: 40
//!     prefix: dev
//!     allocation: split
//!     instance_types: [t3.micro, t3.small]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod report;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, FleetConfig};
pub use error::{FleetformError, Result};
pub use planner::{ChangePlan, DiffEngine, PlanExecutor, ResourceExpander};
pub use provider::{LocalProvider, Provider, ResourceObserver};
pub use reconciler::{PlanOutcome, ReconciliationResult, Reconciler};
pub use report::FleetReport;
pub use state::{FleetState, LocalStateStore, StateStore};

//! CLI module for the fleetform tool.
//!
//! This module provides the command-line interface for planning and
//! applying fleet changes.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;

//! Error types for the fleetform provisioning engine.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation cycle: configuration, state storage, the provider
//! contract, planning, and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a configuration that failed validation.
pub const EXIT_VALIDATION: u8 = 2;

/// Exit code for a cycle that left failed or pending actions behind.
pub const EXIT_PARTIAL_FAILURE: u8 = 3;

/// Exit code for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// The main error type for fleetform.
#[derive(Debug, Error)]
pub enum FleetformError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State storage errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single configuration violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path that failed validation (e.g. `environments.dev.instance_types[1]`).
    pub field: String,
    /// Category of the violation.
    pub kind: ValidationKind,
    /// Human readable description.
    pub message: String,
}

/// Categories of validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// Region identifier is malformed.
    Region,
    /// AMI identifier is malformed.
    Ami,
    /// Instance type is not in the catalog.
    InstanceType,
    /// Environment structure is inconsistent.
    Environment,
    /// Tag map is malformed.
    Tags,
    /// Execution tuning is unusable.
    Execution,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A configuration file is already present and was not replaced.
    #[error("Configuration file already exists: {path} (re-run with --force to replace it)")]
    AlreadyExists {
        /// Path to the existing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// One or more validation rules failed.
    #[error("Configuration validation failed with {} error(s): {}", .errors.len(), summarize(.errors))]
    Invalid {
        /// Every violation found, in check order.
        errors: Vec<ValidationError>,
    },
}

/// State storage errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors raised by a provider implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Resource not found.
    #[error("Resource not found: {id}")]
    ResourceNotFound {
        /// ID of the missing resource.
        id: String,
    },

    /// The provider rejected the request.
    #[error("Provider request failed: {message}")]
    RequestFailed {
        /// Description of the failure.
        message: String,
    },

    /// A provider call did not complete in time.
    #[error("Provider call '{operation}' timed out after {timeout_secs}s for {target}")]
    Timeout {
        /// Provider operation name.
        operation: String,
        /// Resource name, id or prefix the call targeted.
        target: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// The provider inventory could not be read or written.
    #[error("Provider inventory error: {message}")]
    Inventory {
        /// Description of the inventory issue.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// An environment reached the expander in a state validation should have rejected.
    #[error("Cannot expand environment '{environment}': {reason}")]
    Expansion {
        /// Environment name.
        environment: String,
        /// Broken invariant.
        reason: String,
    },

    /// No stored plan is available.
    #[error("No plan has been recorded yet")]
    NoPlan,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Some actions failed or never ran.
    #[error("{failed} action(s) failed and {pending} action(s) are pending after {attempts} attempt(s)")]
    PartialFailure {
        /// Number of failed actions.
        failed: usize,
        /// Number of pending actions.
        pending: usize,
        /// Attempts made.
        attempts: u32,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for fleetform operations.
pub type Result<T> = std::result::Result<T, FleetformError>;

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FleetformError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Timeout { .. } | ProviderError::RequestFailed { .. })
        )
    }

    /// Returns the validation errors if this is a validation failure.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            Self::Config(ConfigError::Invalid { errors }) => Some(errors),
            _ => None,
        }
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(ConfigError::Invalid { .. }) => EXIT_VALIDATION,
            Self::Reconcile(ReconcileError::PartialFailure { .. }) => EXIT_PARTIAL_FAILURE,
            _ => EXIT_FAILURE,
        }
    }
}

impl ConfigError {
    /// Creates a parse error without a source location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: None,
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a request error.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, target: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            target: target.into(),
            timeout_secs,
        }
    }

    /// Creates an inventory error.
    #[must_use]
    pub fn inventory(message: impl Into<String>) -> Self {
        Self::Inventory {
            message: message.into(),
        }
    }
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(kind: ValidationKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Region => "region",
            Self::Ami => "ami",
            Self::InstanceType => "instance_type",
            Self::Environment => "environment",
            Self::Tags => "tags",
            Self::Execution => "execution",
        };
        write!(f, "{s}")
    }
}

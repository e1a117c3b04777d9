//! Configuration module for the fleetform engine.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `fleetform.yaml`
//! - Validation of region, AMI, instance types and environment structure
//! - Computing configuration hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AllocationPolicy, CatalogConfig, EnvironmentConfig, ExecutionConfig, FleetConfig,
    GlobalConfig, ProviderConfig, ProviderKind, StateConfig,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, DEFAULT_STATE_DIR, find_config_file};
pub use validator::{
    COMPUTED_TAG_KEYS, ConfigValidator, DEFAULT_FAMILIES, DEFAULT_SIZES, InstanceCatalog,
    ValidationReport,
};
pub use hash::ConfigHasher;

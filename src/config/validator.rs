//! Configuration validation for fleet definitions.
//!
//! Every rule runs on every pass and all violations are collected, so a
//! caller sees the whole list of problems at once instead of fixing them
//! one run at a time.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::{ConfigError, FleetformError, Result, ValidationError, ValidationKind};

use super::spec::{
    AllocationPolicy, CatalogConfig, EnvironmentConfig, ExecutionConfig, FleetConfig, GlobalConfig,
};

/// Built-in instance families.
pub const DEFAULT_FAMILIES: &[&str] = &[
    "t2", "t3", "t3a", "t4g", "m5", "m6i", "c5", "c6i", "r5", "r6i",
];

/// Built-in instance sizes.
pub const DEFAULT_SIZES: &[&str] = &[
    "nano", "micro", "small", "medium", "large", "xlarge", "2xlarge", "4xlarge", "8xlarge",
    "12xlarge", "16xlarge", "24xlarge",
];

/// Tag keys computed by the expander; defaults with these keys are overridden.
pub const COMPUTED_TAG_KEYS: &[&str] = &["Name", "Environment", "Type"];

static REGION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}-[a-z]+-[0-9]$").expect("Invalid region regex"));

static AMI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ami-[0-9a-f]{8,17}$").expect("Invalid AMI regex"));

static DEFAULT_CATALOG: Lazy<InstanceCatalog> =
    Lazy::new(|| InstanceCatalog::with_additions(None).expect("Invalid built-in instance catalog"));

/// Validator for fleet configurations.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    /// Families and sizes accepted in instance types.
    catalog: InstanceCatalog,
}

/// Enumerated instance families and sizes, held as data.
#[derive(Debug, Clone)]
pub struct InstanceCatalog {
    families: Vec<String>,
    sizes: Vec<String>,
    pattern: Regex,
}

/// Non-fatal findings from a successful validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl InstanceCatalog {
    /// Builds a catalog from explicit family and size lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lists produce an unusable pattern.
    pub fn new(families: Vec<String>, sizes: Vec<String>) -> Result<Self> {
        let alternation = |items: &[String]| {
            items
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|")
        };
        let pattern = format!(r"^({})\.({})$", alternation(&families), alternation(&sizes));
        let pattern = Regex::new(&pattern)
            .map_err(|e| ConfigError::parse(format!("Invalid instance catalog: {e}")))?;

        Ok(Self {
            families,
            sizes,
            pattern,
        })
    }

    /// Builds the built-in catalog extended with configured additions.
    ///
    /// # Errors
    ///
    /// Returns an error if the additions produce an unusable pattern.
    pub fn with_additions(additions: Option<&CatalogConfig>) -> Result<Self> {
        let mut families: Vec<String> = DEFAULT_FAMILIES.iter().map(|s| (*s).to_string()).collect();
        let mut sizes: Vec<String> = DEFAULT_SIZES.iter().map(|s| (*s).to_string()).collect();

        if let Some(extra) = additions {
            for family in &extra.extra_families {
                if !families.contains(family) {
                    families.push(family.clone());
                }
            }
            for size in &extra.extra_sizes {
                if !sizes.contains(size) {
                    sizes.push(size.clone());
                }
            }
        }

        Self::new(families, sizes)
    }

    /// Returns true if `instance_type` is `<family>.<size>` from this catalog.
    #[must_use]
    pub fn accepts(&self, instance_type: &str) -> bool {
        self.pattern.is_match(instance_type)
    }

    /// Describes why `instance_type` is not accepted.
    #[must_use]
    pub fn explain_rejection(&self, instance_type: &str) -> String {
        let Some((family, size)) = instance_type.split_once('.') else {
            return format!("Instance type '{instance_type}' is not of the form <family>.<size>");
        };
        if !self.families().iter().any(|f| f == family) {
            format!(
                "Instance type '{instance_type}' has unknown family '{family}' (known: {})",
                self.families().join(", ")
            )
        } else if !self.sizes().iter().any(|s| s == size) {
            format!(
                "Instance type '{instance_type}' has unknown size '{size}' (known: {})",
                self.sizes().join(", ")
            )
        } else {
            format!("Instance type '{instance_type}' is not a known <family>.<size>")
        }
    }

    /// Returns the accepted families.
    #[must_use]
    pub fn families(&self) -> &[String] {
        &self.families
    }

    /// Returns the accepted sizes.
    #[must_use]
    pub fn sizes(&self) -> &[String] {
        &self.sizes
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Creates a validator with the built-in catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: DEFAULT_CATALOG.clone(),
        }
    }

    /// Creates a validator for a configuration, honouring its catalog additions.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog additions are unusable.
    pub fn for_config(config: &FleetConfig) -> Result<Self> {
        Ok(Self {
            catalog: InstanceCatalog::with_additions(config.instance_catalog.as_ref())?,
        })
    }

    /// Creates a validator with an explicit catalog.
    #[must_use]
    pub const fn with_catalog(catalog: InstanceCatalog) -> Self {
        Self { catalog }
    }

    /// Returns the catalog in use.
    #[must_use]
    pub const fn catalog(&self) -> &InstanceCatalog {
        &self.catalog
    }

    /// Validates a whole configuration document, execution tuning included.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` carrying every violation found.
    pub fn validate_config(&self, config: &FleetConfig) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        let mut report = ValidationReport::default();

        self.collect(&config.global, &config.environments, &mut errors, &mut report);
        Self::validate_execution(&config.execution, &mut errors);

        Self::finish(errors, report)
    }

    /// Validates the global settings and every environment.
    ///
    /// Region, AMI and instance-type checks run independently; a failure in
    /// one never hides failures in another.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` carrying every violation found.
    pub fn validate(
        &self,
        global: &GlobalConfig,
        environments: &BTreeMap<String, EnvironmentConfig>,
    ) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        let mut report = ValidationReport::default();

        self.collect(global, environments, &mut errors, &mut report);

        Self::finish(errors, report)
    }

    fn collect(
        &self,
        global: &GlobalConfig,
        environments: &BTreeMap<String, EnvironmentConfig>,
        errors: &mut Vec<ValidationError>,
        report: &mut ValidationReport,
    ) {
        Self::validate_region(&global.region, errors);
        Self::validate_ami(&global.ami, errors);
        self.validate_instance_types(environments, errors);
        Self::validate_default_tags(&global.default_tags, errors, report);
        Self::validate_environments(environments, errors, report);
    }

    fn finish(errors: Vec<ValidationError>, report: ValidationReport) -> Result<ValidationReport> {
        if errors.is_empty() {
            debug!(
                "Configuration validation passed with {} warning(s)",
                report.warnings.len()
            );
            Ok(report)
        } else {
            debug!("Configuration validation failed with {} error(s)", errors.len());
            Err(FleetformError::Config(ConfigError::Invalid { errors }))
        }
    }

    /// A zero timeout would cancel every provider call before it starts.
    fn validate_execution(execution: &ExecutionConfig, errors: &mut Vec<ValidationError>) {
        if execution.timeout_secs == 0 {
            errors.push(ValidationError::new(
                ValidationKind::Execution,
                "execution.timeout_secs",
                "Timeout must be at least 1 second",
            ));
        }
    }

    fn validate_region(region: &str, errors: &mut Vec<ValidationError>) {
        if !REGION_REGEX.is_match(region) {
            errors.push(ValidationError::new(
                ValidationKind::Region,
                "global.region",
                format!("Region '{region}' is invalid. Expected a form like 'us-east-1'."),
            ));
        }
    }

    fn validate_ami(ami: &str, errors: &mut Vec<ValidationError>) {
        if !AMI_REGEX.is_match(ami) {
            errors.push(ValidationError::new(
                ValidationKind::Ami,
                "global.ami",
                format!("AMI '{ami}' is invalid. Expected 'ami-' followed by 8 to 17 hex digits."),
            ));
        }
    }

    /// Checks every instance type of every environment against the catalog.
    fn validate_instance_types(
        &self,
        environments: &BTreeMap<String, EnvironmentConfig>,
        errors: &mut Vec<ValidationError>,
    ) {
        for (name, env) in environments {
            for (i, instance_type) in env.instance_types.iter().enumerate() {
                if !self.catalog.accepts(instance_type) {
                    errors.push(ValidationError::new(
                        ValidationKind::InstanceType,
                        format!("environments.{name}.instance_types[{i}]"),
                        self.catalog.explain_rejection(instance_type),
                    ));
                }
            }
        }
    }

    fn validate_default_tags(
        tags: &BTreeMap<String, String>,
        errors: &mut Vec<ValidationError>,
        report: &mut ValidationReport,
    ) {
        for key in tags.keys() {
            if key.trim().is_empty() {
                errors.push(ValidationError::new(
                    ValidationKind::Tags,
                    "global.default_tags",
                    "Tag keys cannot be empty",
                ));
            } else if COMPUTED_TAG_KEYS.contains(&key.as_str()) {
                report.warnings.push(format!(
                    "global.default_tags.{key}: overridden by the computed '{key}' tag on every resource"
                ));
            }
        }
    }

    /// Validates the structure of every environment.
    fn validate_environments(
        environments: &BTreeMap<String, EnvironmentConfig>,
        errors: &mut Vec<ValidationError>,
        report: &mut ValidationReport,
    ) {
        if environments.is_empty() {
            report.warnings.push(String::from("No environments defined in configuration"));
            return;
        }

        let mut prefixes: HashMap<&str, &str> = HashMap::new();

        for (name, env) in environments {
            let field = format!("environments.{name}");

            if !is_valid_name(name) {
                errors.push(ValidationError::new(
                    ValidationKind::Environment,
                    field.clone(),
                    format!(
                        "Environment name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                    ),
                ));
            }

            if is_valid_name(&env.prefix) {
                if let Some(other) = prefixes.insert(env.prefix.as_str(), name.as_str()) {
                    errors.push(ValidationError::new(
                        ValidationKind::Environment,
                        format!("{field}.prefix"),
                        format!("Prefix '{}' is already used by environment '{other}'", env.prefix),
                    ));
                }
            } else {
                errors.push(ValidationError::new(
                    ValidationKind::Environment,
                    format!("{field}.prefix"),
                    format!(
                        "Prefix '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        env.prefix
                    ),
                ));
            }

            Self::validate_pool(name, env, &field, errors, report);

            for key in env.tags.keys() {
                if key.trim().is_empty() {
                    errors.push(ValidationError::new(
                        ValidationKind::Tags,
                        format!("{field}.tags"),
                        "Tag keys cannot be empty",
                    ));
                }
            }

            if env.count == 0 {
                report.warnings.push(format!("{field}.count: environment has no instances"));
            } else if env.count > 99 {
                report.warnings.push(format!(
                    "{field}.count: {} instances widen names past two digits",
                    env.count
                ));
            }
        }
    }

    /// Checks the instance type pool against the allocation policy.
    fn validate_pool(
        name: &str,
        env: &EnvironmentConfig,
        field: &str,
        errors: &mut Vec<ValidationError>,
        report: &mut ValidationReport,
    ) {
        let pool = env.instance_types.len();

        if env.count > 0 && pool == 0 {
            errors.push(ValidationError::new(
                ValidationKind::Environment,
                format!("{field}.instance_types"),
                format!("Environment '{name}' wants {} instances but lists no instance types", env.count),
            ));
            return;
        }

        match env.allocation {
            AllocationPolicy::Split if env.count > 0 && pool != 2 => {
                errors.push(ValidationError::new(
                    ValidationKind::Environment,
                    format!("{field}.instance_types"),
                    format!("Split allocation requires exactly 2 instance types, found {pool}"),
                ));
            }
            AllocationPolicy::Constant if pool > 1 => {
                report.warnings.push(format!(
                    "{field}.instance_types: constant allocation only uses '{}'",
                    env.instance_types[0]
                ));
            }
            _ => {}
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationReport {
    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(region: &str, ami: &str) -> GlobalConfig {
        GlobalConfig {
            region: region.to_string(),
            ami: ami.to_string(),
            default_tags: BTreeMap::new(),
        }
    }

    fn env(prefix: &str, count: u32, types: &[&str], allocation: AllocationPolicy) -> EnvironmentConfig {
        EnvironmentConfig {
            count,
            prefix: prefix.to_string(),
            instance_types: types.iter().map(|s| (*s).to_string()).collect(),
            environment_tag: None,
            allocation,
            tags: BTreeMap::new(),
        }
    }

    fn envs(items: Vec<(&str, EnvironmentConfig)>) -> BTreeMap<String, EnvironmentConfig> {
        items.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn errors_of(result: Result<ValidationReport>) -> Vec<ValidationError> {
        result
            .unwrap_err()
            .validation_errors()
            .map(<[ValidationError]>::to_vec)
            .unwrap_or_default()
    }

    #[test]
    fn test_region_pattern() {
        assert!(REGION_REGEX.is_match("us-east-1"));
        assert!(REGION_REGEX.is_match("eu-central-1"));
        assert!(!REGION_REGEX.is_match("US-East-1"));
        assert!(!REGION_REGEX.is_match("us-east-12"));
        assert!(!REGION_REGEX.is_match("useast1"));
    }

    #[test]
    fn test_ami_pattern() {
        assert!(AMI_REGEX.is_match("ami-0123abcd"));
        assert!(AMI_REGEX.is_match("ami-0123456789abcdef0"));
        assert!(!AMI_REGEX.is_match("ami-xyz"));
        assert!(!AMI_REGEX.is_match("ami-0123abc"));
        assert!(!AMI_REGEX.is_match("ami-0123456789abcdef01"));
    }

    #[test]
    fn test_catalog_membership() {
        let validator = ConfigValidator::new();
        assert!(validator.catalog().accepts("t3.medium"));
        assert!(validator.catalog().accepts("m6i.24xlarge"));
        assert!(!validator.catalog().accepts("t9.large"));
        assert!(!validator.catalog().accepts("t3.metal"));
        assert!(!validator.catalog().accepts("t3medium"));
    }

    #[test]
    fn test_catalog_additions() {
        let additions = CatalogConfig {
            extra_families: vec![String::from("m7g")],
            extra_sizes: vec![String::from("metal")],
        };
        let catalog = InstanceCatalog::with_additions(Some(&additions)).unwrap();
        assert!(catalog.accepts("t3.metal"));
        assert!(catalog.accepts("m7g.large"));
        assert!(catalog.accepts("t3.micro"));
    }

    #[test]
    fn test_valid_configuration_passes() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![(
            "prod",
            env("prod", 25, &["t3.medium"], AllocationPolicy::Constant),
        )]);
        let report = validator
            .validate(&global("us-east-1", "ami-0123abcd"), &environments)
            .unwrap();
        assert_eq!(report.warning_count(), 0);
    }

    #[test]
    fn test_collects_all_categories() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![
            ("dev", env("dev", 2, &["t9.large", "t3.medium"], AllocationPolicy::Split)),
            ("prod", env("prod", 1, &["x1.huge"], AllocationPolicy::Cycle)),
        ]);
        let errors = errors_of(validator.validate(&global("US-East-1", "ami-xyz"), &environments));

        let kinds: Vec<ValidationKind> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationKind::Region,
                ValidationKind::Ami,
                ValidationKind::InstanceType,
                ValidationKind::InstanceType,
            ]
        );
        assert_eq!(errors[2].field, "environments.dev.instance_types[0]");
        assert_eq!(errors[3].field, "environments.prod.instance_types[0]");
    }

    #[test]
    fn test_split_requires_two_types() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![(
            "dev",
            env("dev", 4, &["t3.micro"], AllocationPolicy::Split),
        )]);
        let errors = errors_of(validator.validate(&global("us-east-1", "ami-0123abcd"), &environments));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationKind::Environment);
        assert!(errors[0].message.contains("exactly 2"));
    }

    #[test]
    fn test_empty_pool_with_count() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![("dev", env("dev", 3, &[], AllocationPolicy::Cycle))]);
        let errors = errors_of(validator.validate(&global("us-east-1", "ami-0123abcd"), &environments));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "environments.dev.instance_types");
    }

    #[test]
    fn test_zero_count_is_a_warning() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![("qa", env("qa", 0, &[], AllocationPolicy::Cycle))]);
        let report = validator
            .validate(&global("us-east-1", "ami-0123abcd"), &environments)
            .unwrap();
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_duplicate_prefix() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![
            ("a", env("web", 1, &["t3.micro"], AllocationPolicy::Cycle)),
            ("b", env("web", 1, &["t3.micro"], AllocationPolicy::Cycle)),
        ]);
        let errors = errors_of(validator.validate(&global("us-east-1", "ami-0123abcd"), &environments));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "environments.b.prefix");
    }

    #[test]
    fn test_overridden_default_tag_warns() {
        let validator = ConfigValidator::new();
        let mut g = global("us-east-1", "ami-0123abcd");
        g.default_tags.insert(String::from("Name"), String::from("shadowed"));
        let report = validator.validate(&g, &BTreeMap::new()).unwrap();
        assert_eq!(report.warning_count(), 2);
    }

    #[test]
    fn test_split_with_zero_count_needs_no_types() {
        let validator = ConfigValidator::new();
        let environments = envs(vec![("qa", env("qa", 0, &[], AllocationPolicy::Split))]);
        let report = validator
            .validate(&global("us-east-1", "ami-0123abcd"), &environments)
            .unwrap();
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = FleetConfig {
            global: global("us-east-1", "ami-0123abcd"),
            environments: envs(vec![("dev", env("dev", 2, &["t3.micro"], AllocationPolicy::Cycle))]),
            instance_catalog: None,
            execution: ExecutionConfig::default(),
            state: crate::config::StateConfig::default(),
            provider: crate::config::ProviderConfig::default(),
        };
        assert!(ConfigValidator::new().validate_config(&config).is_ok());

        config.execution.timeout_secs = 0;
        let errors = errors_of(ConfigValidator::new().validate_config(&config));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationKind::Execution);
        assert_eq!(errors[0].field, "execution.timeout_secs");
    }

    #[test]
    fn test_rejection_names_the_unknown_part() {
        let catalog = ConfigValidator::new().catalog().clone();

        let family = catalog.explain_rejection("t9.large");
        assert!(family.contains("unknown family 't9'"));
        assert!(family.contains("t3a"));

        let size = catalog.explain_rejection("t3.metal");
        assert!(size.contains("unknown size 'metal'"));
        assert!(size.contains("24xlarge"));

        assert!(catalog.explain_rejection("t3medium").contains("<family>.<size>"));
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("prod"));
        assert!(is_valid_name("web-tier-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Prod"));
        assert!(!is_valid_name("2prod"));
        assert!(!is_valid_name("prod_web"));
        assert!(!is_valid_name("prod-"));
        assert!(!is_valid_name("prod--web"));
    }
}

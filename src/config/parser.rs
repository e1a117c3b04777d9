//! Configuration parser for loading fleet definitions.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and environment variable overrides, with proper precedence and error
//! handling.

use crate::error::{ConfigError, FleetformError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::FleetConfig;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["fleetform.yaml", "fleetform.yml"];

/// Default state directory name.
pub const DEFAULT_STATE_DIR: &str = ".fleetform";

/// Configuration parser for loading fleet configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<FleetConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(FleetformError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetformError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<FleetConfig> {
        debug!("Parsing YAML configuration");

        let config: FleetConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            FleetformError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration with {} environment(s) in region {}",
            config.environments.len(),
            config.global.region
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `FLEETFORM_REGION`, `FLEETFORM_AMI`,
    /// `FLEETFORM_STATE_DIR`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<FleetConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up through `lookup` to the configuration.
    fn apply_env_overrides(config: &mut FleetConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup("FLEETFORM_REGION") {
            debug!("Overriding global.region from environment");
            config.global.region = region;
        }

        if let Some(ami) = lookup("FLEETFORM_AMI") {
            debug!("Overriding global.ami from environment");
            config.global.ami = ami;
        }

        if let Some(dir) = lookup("FLEETFORM_STATE_DIR") {
            debug!("Overriding state.dir from environment");
            config.state.dir = Some(dir);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                FleetformError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves the state directory for a configuration.
    ///
    /// Relative paths are resolved against the parser's base path.
    #[must_use]
    pub fn state_dir(&self, config: &FleetConfig) -> PathBuf {
        let dir = config.state.dir.as_deref().unwrap_or(DEFAULT_STATE_DIR);
        self.resolve(dir)
    }

    /// Resolves the local provider inventory file for a configuration.
    #[must_use]
    pub fn inventory_path(&self, config: &FleetConfig) -> PathBuf {
        config.provider.inventory.as_deref().map_or_else(
            || self.state_dir(config).join("inventory.json"),
            |p| self.resolve(p),
        )
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

/// Finds the configuration file in the start directory or its parents.
///
/// The start directory is made absolute first, so `.` walks up from the
/// working directory.
///
/// # Errors
///
/// Returns an error if the start directory cannot be resolved or no
/// configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let not_found = || {
        FleetformError::Config(ConfigError::FileNotFound {
            path: start.join(DEFAULT_CONFIG_FILES[0]),
        })
    };
    let mut current = std::fs::canonicalize(start).map_err(|e| {
        debug!("Cannot resolve {}: {e}", start.display());
        not_found()
    })?;

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationPolicy;
    use std::collections::HashMap;

    const FLEET_YAML: &str = r#"
global:
  region: us-east-1
  ami: ami-0123abcd
  default_tags:
    Owner: infra

environments:
  dev:
    count: 40
    prefix: dev
    instance_types: [t3.micro, t3.small]
    allocation: split
  prod:
    count: 25
    prefix: prod
    instance_types: [m5.large]
    allocation: constant
    environment_tag: production

execution:
  batch_size: 5
  fail_fast: true
"#;

    #[test]
    fn test_parse_fleet_config() {
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(FLEET_YAML, None).unwrap();

        assert_eq!(config.global.region, "us-east-1");
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.total_count(), 65);

        let dev = &config.environments["dev"];
        assert_eq!(dev.allocation, AllocationPolicy::Split);
        assert_eq!(dev.instance_types, vec!["t3.micro", "t3.small"]);

        let prod = &config.environments["prod"];
        assert_eq!(prod.environment_tag_or("prod"), "production");

        assert_eq!(config.execution.batch_size, 5);
        assert!(config.execution.fail_fast);
        assert_eq!(config.execution.timeout_secs, 30);
    }

    #[test]
    fn test_parse_error_reports_location() {
        let parser = ConfigParser::new();
        let err = parser
            .parse_yaml("global: [", Some(Path::new("fleetform.yaml")))
            .unwrap_err();
        match err {
            FleetformError::Config(ConfigError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("fleetform.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let parser = ConfigParser::new();
        let mut config = parser.parse_yaml(FLEET_YAML, None).unwrap();
        let vars: HashMap<&str, &str> =
            HashMap::from([("FLEETFORM_REGION", "eu-west-1"), ("FLEETFORM_STATE_DIR", "/tmp/ff")]);

        ConfigParser::apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.global.region, "eu-west-1");
        assert_eq!(config.global.ami, "ami-0123abcd");
        assert_eq!(config.state.dir.as_deref(), Some("/tmp/ff"));
    }

    #[test]
    fn test_paths_resolve_against_base() {
        let parser = ConfigParser::new().with_base_path("/srv/fleet");
        let config = parser.parse_yaml(FLEET_YAML, None).unwrap();

        assert_eq!(parser.state_dir(&config), PathBuf::from("/srv/fleet/.fleetform"));
        assert_eq!(
            parser.inventory_path(&config),
            PathBuf::from("/srv/fleet/.fleetform/inventory.json")
        );
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("fleetform.yaml"), FLEET_YAML).unwrap();

        let found = find_config_file(&nested).unwrap();
        let root = std::fs::canonicalize(temp.path()).unwrap();
        assert_eq!(found, root.join("fleetform.yaml"));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_config_file_from_relative_start() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
        std::fs::write(temp.path().join("fleetform.yaml"), FLEET_YAML).unwrap();
        let root = std::fs::canonicalize(temp.path()).unwrap();

        // Climb from the working directory to `/`, then descend with a detour.
        let cwd = std::env::current_dir().unwrap();
        let mut relative = PathBuf::new();
        for _ in 1..cwd.components().count() {
            relative.push("..");
        }
        relative.push(root.strip_prefix("/").unwrap());
        relative.push("a/../a/b");
        assert!(relative.is_relative());

        let found = find_config_file(&relative).unwrap();
        assert!(found.is_absolute());
        assert_eq!(found, root.join("fleetform.yaml"));
    }

    #[test]
    fn test_find_config_file_missing_start() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = find_config_file(temp.path().join("gone")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_bundled_template_is_valid() {
        let parser = ConfigParser::new();
        let config = parser
            .parse_yaml(include_str!("../../templates/fleetform.yaml"), None)
            .unwrap();

        let report = crate::config::ConfigValidator::for_config(&config)
            .unwrap()
            .validate_config(&config)
            .unwrap();
        assert_eq!(report.warning_count(), 0);

        let desired = crate::planner::ResourceExpander::expand_all(&config).unwrap();
        assert_eq!(desired.total(), 100);
        assert_eq!(desired.environment("dev").len(), 40);
    }
}

//! Fleetform CLI entrypoint.
//!
//! This is the main entrypoint for the fleetform command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fleetform::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use fleetform::config::{
    find_config_file, ConfigParser, ConfigValidator, DEFAULT_STATE_DIR, FleetConfig, ProviderKind,
};
use fleetform::error::{ConfigError, FleetformError, PlanError, Result};
use fleetform::provider::LocalProvider;
use fleetform::reconciler::Reconciler;
use fleetform::state::{LocalStateStore, StateStore};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Parses arguments, runs the command and maps errors to exit codes.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Cannot start the tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(errors) = e.validation_errors() {
                for error in errors {
                    eprintln!("  - {error}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Sets up the tracing subscriber on stderr.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Dispatches the parsed command.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply {
            yes,
            fail_fast,
            no_prune,
            max_attempts,
            expect_fingerprint,
        } => {
            let options = ApplyOptions {
                auto_approve: yes,
                fail_fast,
                no_prune,
                max_attempts,
                expect_fingerprint,
            };
            cmd_apply(cli.config.as_ref(), options, &formatter).await
        }
        Commands::Show { history } => cmd_show(cli.config.as_ref(), history, &formatter).await,
    }
}

/// Flags of the `apply` command.
struct ApplyOptions {
    auto_approve: bool,
    fail_fast: bool,
    no_prune: bool,
    max_attempts: Option<u32>,
    expect_fingerprint: Option<String>,
}

/// Write a starter configuration.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new fleetform project in: {}", path.display());

    let config_path = path.join("fleetform.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        return Err(ConfigError::AlreadyExists { path: config_path }.into());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/fleetform.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{DEFAULT_STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# fleetform")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nFleet project ready. Next:");
    eprintln!("  1. Edit fleetform.yaml with your environments");
    eprintln!("  2. Run 'fleetform validate' to check your configuration");
    eprintln!("  3. Run 'fleetform plan' to see what would change");
    eprintln!("  4. Run 'fleetform apply' to converge the fleet");

    Ok(())
}

/// Validate the configuration without touching the provider.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _parser) = load_config(config_path)?;

    let report = ConfigValidator::for_config(&config)?.validate_config(&config)?;

    formatter.emit(&formatter.format_validation(&config, &report, show_warnings))
}

/// Show the change plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, parser) = load_config(config_path)?;
    let provider = open_provider(&parser, &config).await?;
    let state_store = LocalStateStore::with_base_dir(parser.state_dir(&config));

    let outcome = Reconciler::new(&config, &state_store, &provider).plan().await?;

    formatter.emit(&formatter.format_plan(&outcome, detailed))
}

/// Apply the change plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    options: ApplyOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, parser) = load_config(config_path)?;
    let provider = open_provider(&parser, &config).await?;
    let state_store = LocalStateStore::with_base_dir(parser.state_dir(&config));

    let mut execution = config.execution.clone();
    execution.fail_fast |= options.fail_fast;
    execution.prune &= !options.no_prune;
    if let Some(max_attempts) = options.max_attempts {
        execution.max_attempts = max_attempts;
    }

    let reconciler = Reconciler::new(&config, &state_store, &provider).with_execution(execution);

    let mut expected = options.expect_fingerprint;
    if !options.auto_approve {
        let outcome = reconciler.plan().await?;
        if outcome.plan.is_empty() {
            formatter.emit(&formatter.format_plan(&outcome, false))?;
            return Ok(());
        }

        let preview = OutputFormatter::new(OutputFormat::Text);
        eprintln!("{}", preview.format_plan(&outcome, false));
        eprint!("Apply these changes to the fleet? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Nothing applied.");
            return Ok(());
        }

        // Apply exactly what was shown.
        if expected.is_none() {
            expected = Some(outcome.fingerprint);
        }
    }

    let result = reconciler.apply(expected.as_deref()).await?;

    formatter.emit(&formatter.format_reconciliation(&result))?;
    result.ensure_converged()
}

/// Show recorded state.
async fn cmd_show(
    config_path: Option<&PathBuf>,
    show_history: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, parser) = load_config(config_path)?;
    let state_store = LocalStateStore::with_base_dir(parser.state_dir(&config));

    if !state_store.exists().await? {
        return Err(FleetformError::Plan(PlanError::NoPlan));
    }

    let state = state_store
        .load()
        .await?
        .filter(|s| s.last_plan.is_some())
        .ok_or(FleetformError::Plan(PlanError::NoPlan))?;

    formatter.emit(&formatter.format_state(&state, show_history))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads configuration, `.env` and environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<(FleetConfig, ConfigParser)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base_path = config_file.parent().unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base_path);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((config, parser))
}

/// Opens the provider selected by the configuration.
async fn open_provider(parser: &ConfigParser, config: &FleetConfig) -> Result<LocalProvider> {
    match config.provider.kind {
        ProviderKind::Local => {
            let provider = LocalProvider::open(parser.inventory_path(config)).await?;
            debug!("Using local inventory: {}", provider.path().display());
            Ok(provider)
        }
    }
}

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use packman::settings::LoggingSettings;
use packman::{
    AcquireReport, Executor, GetOutcome, LogContext, PackContext, PackOutcome, Registry, Settings,
};

const LOG_ENV: &str = "PACKMAN_LOG";

/// packman - fetch component sources and package them with fpm
#[derive(Parser)]
#[command(name = "packman")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: ./packman.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Component registry, overriding the settings file
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve a component's sources
    Get { component: String },
    /// Package a component's sources
    Pack { component: String },
    /// Retrieve, then package
    Make { component: String },
    /// List the components in the registry
    List,
    /// Print a component's configuration as JSON
    Show { component: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (settings, settings_path) = Settings::discover(cli.config.as_deref())?;
    init_logging(&settings.logging, cli.verbose)?;
    match &settings_path {
        Some(path) => tracing::debug!("using settings from {}", path.display()),
        None => tracing::debug!("no settings file found, using defaults"),
    }

    let registry_path = cli.registry.clone().unwrap_or_else(|| settings.registry.clone());
    let registry = Registry::load(&registry_path)
        .with_context(|| format!("Failed to load registry {}", registry_path.display()))?;

    match &cli.command {
        Commands::List => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Show { component } => {
            let config = registry.get(component)?;
            println!("{}", serde_json::to_string_pretty(config)?);
            Ok(())
        }
        Commands::Get { component } => {
            let ctx = pack_context(&settings)?;
            report_get(component, packman::get(registry.get(component)?, component, &ctx)?);
            Ok(())
        }
        Commands::Pack { component } => {
            let ctx = pack_context(&settings)?;
            report_pack(component, packman::pack(registry.get(component)?, component, &ctx)?);
            Ok(())
        }
        Commands::Make { component } => {
            let ctx = pack_context(&settings)?;
            let (acquired, packed) = packman::make(registry.get(component)?, component, &ctx)?;
            report_get(component, acquired);
            report_pack(component, packed);
            Ok(())
        }
    }
}

fn pack_context(settings: &Settings) -> Result<PackContext> {
    let log = LogContext::new(settings.logging.print_templates);
    let runner = Arc::new(Executor::new(
        settings.retry_policy(),
        settings.executor.privilege,
        log.clone(),
    ));
    let base_dir = std::env::current_dir().context("Failed to determine working directory")?;
    Ok(PackContext::new(
        runner,
        base_dir,
        settings.templates_dir.clone(),
        log,
    ))
}

fn report_get(component: &str, outcome: GetOutcome) {
    match outcome {
        GetOutcome::Disabled => println!("{component}: retrieval is manual, nothing fetched"),
        GetOutcome::Completed(report) => print_acquire_report(component, &report),
    }
}

fn print_acquire_report(component: &str, report: &AcquireReport) {
    let failed: Vec<String> = report.failed().map(ToString::to_string).collect();
    if failed.is_empty() {
        println!(
            "{component}: sources ready in {}",
            report.sources_path.display()
        );
    } else {
        println!(
            "{component}: sources in {} with {} failed step(s):",
            report.sources_path.display(),
            failed.len()
        );
        for step in failed {
            println!("  - {step}");
        }
    }
}

fn report_pack(component: &str, outcome: PackOutcome) {
    match outcome {
        PackOutcome::Disabled => println!("{component}: packaging is manual, nothing packed"),
        PackOutcome::Completed { artifacts } if artifacts.is_empty() => {
            println!("{component}: packed, no artifacts produced")
        }
        PackOutcome::Completed { artifacts } => {
            println!("{component}: packed");
            for artifact in artifacts {
                println!("  {}", artifact.display());
            }
        }
    }
}

fn init_logging(settings: &LoggingSettings, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };

    let file_layer = match &settings.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if parent.is_file() {
            bail!(
                "Log directory {} exists as a file, cannot create log {}",
                parent.display(),
                path.display()
            );
        }
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

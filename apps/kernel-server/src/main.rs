use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use mimalloc::MiMalloc;
use modkit::{run, DbOptions, RunOptions, ShutdownOptions};
use runtime::{AppConfig, CliArgs};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Ensure modules are linked and registered via inventory: each of these
// crates' `#[modkit::module(...)]` submissions only run if the crate is
// actually linked into the binary, and nothing else here names them.
#[allow(dead_code)]
fn ensure_modules_linked() {
    let _ = std::any::type_name::<api_ingress::ApiIngress>();
    let _ = std::any::type_name::<settings::SettingsModule>();
    let _ = std::any::type_name::<scheduler::SchedulerModule>();
    let _ = std::any::type_name::<greeter::GreeterModule>();
}

// Force SQLx driver registration (workaround for SQLx 0.8's Any driver).
#[allow(unused_imports)]
use sqlx::{postgres::Postgres, sqlite::Sqlite};

#[allow(dead_code)]
fn ensure_drivers_linked() {
    let _ = std::any::type_name::<Sqlite>();
    let _ = std::any::type_name::<Postgres>();
}

/// Supplies each module's `modules.<name>` config section (raw JSON) from
/// the loaded [`AppConfig`]'s module bag.
struct ModulesConfigProvider(HashMap<String, serde_json::Value>);

impl modkit::ConfigProvider for ModulesConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.get(module_name)
    }
}

/// Kernel Server - modular application runtime.
#[derive(Parser)]
#[command(name = "kernel-server")]
#[command(about = "Kernel Server - modular application runtime")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run without a database (skips DbManager wiring entirely)
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    ensure_drivers_linked();
    ensure_modules_linked();

    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
        mock: cli.mock,
    };

    // Load configuration (normalized home_dir is applied inside).
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.server.home_dir));
    tracing::info!("Kernel Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, cli.config.as_deref(), cli.mock).await,
        Commands::Check => check_config(config).await,
    }
}

/// Builds the Figment layer [`modkit_db::DbManager`] reads its per-module
/// `database` sections from. Mirrors the layering [`AppConfig::load_layered`]
/// uses (YAML file, then `APP__`-prefixed environment overrides).
fn build_db_figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = config_path {
        figment = figment.merge(Yaml::file(path));
    }
    figment.merge(Env::prefixed("APP__").split("__"))
}

async fn run_server(config: AppConfig, config_path: Option<&Path>, mock: bool) -> Result<()> {
    tracing::info!("Bootstrapping runtime...");
    let base_dir = PathBuf::from(&config.server.home_dir);
    bootstrap::run_bootstrap(&base_dir).await?;

    tracing::info!("Initializing modules...");
    let modules_cfg = Arc::new(ModulesConfigProvider(config.modules.clone()));

    let db_options = if mock {
        tracing::warn!("--mock passed, running without a database");
        DbOptions::None
    } else if config.database.is_some() {
        let figment = build_db_figment(config_path);
        let manager = modkit_db::DbManager::from_figment(figment, base_dir.clone())?;
        DbOptions::Manager(Arc::new(manager))
    } else {
        tracing::warn!("No database configuration found, running without database");
        DbOptions::None
    };

    let run_options = RunOptions {
        modules_cfg,
        db: db_options,
        shutdown: ShutdownOptions::Signals,
    };

    run(run_options).await
}

async fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("Server config:");
    println!("{}", config.to_yaml()?);
    Ok(())
}
